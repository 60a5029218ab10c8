use crate::models::{
    CommentRow, MessageRow, OrderItemRow, OrderRow, PostRow, ProductRow, TagRow, TopicRow, UserRow,
};
use crate::{Database, StoreError, StoreResult};
use rusqlite::{Connection, params};
use std::collections::HashMap;
use uuid::Uuid;

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, created_at: &str) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, created_at) VALUES (?1, ?2, ?3)",
                (id, username, created_at),
            )
            .map_err(|e| unique_conflict(e, "username already taken"))?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: &str) -> StoreResult<UserRow> {
        self.with_conn(|conn| query_user(conn, id)?.ok_or_else(|| StoreError::not_found("user", id)))
    }

    pub fn list_users(&self) -> StoreResult<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, created_at FROM users ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_user(&self, id: &str, username: Option<&str>) -> StoreResult<UserRow> {
        self.with_conn_mut(|conn| {
            let changed = conn
                .execute(
                    "UPDATE users SET username = COALESCE(?2, username) WHERE id = ?1",
                    params![id, username],
                )
                .map_err(|e| unique_conflict(e, "username already taken"))?;
            if changed == 0 {
                return Err(StoreError::not_found("user", id));
            }
            query_user(conn, id)?.ok_or_else(|| StoreError::not_found("user", id))
        })
    }

    /// Deleting a user removes their messages and orders; authored posts
    /// are detached, not deleted.
    pub fn delete_user(&self, id: &str) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            ensure_user(&tx, id)?;
            tx.execute("UPDATE posts SET author_id = NULL WHERE author_id = ?1", [id])?;
            tx.execute(
                "DELETE FROM messages WHERE sender_id = ?1 OR recipient_id = ?1",
                [id],
            )?;
            tx.execute(
                "DELETE FROM order_items WHERE order_id IN (SELECT id FROM orders WHERE user_id = ?1)",
                [id],
            )?;
            tx.execute("DELETE FROM orders WHERE user_id = ?1", [id])?;
            tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(())
        })
    }

    // -- Topics --

    pub fn create_topic(&self, id: &str, title: &str, created_at: &str) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO topics (id, title, created_at) VALUES (?1, ?2, ?3)",
                (id, title, created_at),
            )?;
            Ok(())
        })
    }

    pub fn get_topic(&self, id: &str) -> StoreResult<TopicRow> {
        self.with_conn(|conn| {
            query_topic(conn, id)?.ok_or_else(|| StoreError::not_found("topic", id))
        })
    }

    pub fn list_topics(&self) -> StoreResult<Vec<TopicRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, created_at FROM topics ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([], map_topic)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_topic(&self, id: &str, title: Option<&str>) -> StoreResult<TopicRow> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE topics SET title = COALESCE(?2, title) WHERE id = ?1",
                params![id, title],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("topic", id));
            }
            query_topic(conn, id)?.ok_or_else(|| StoreError::not_found("topic", id))
        })
    }

    /// Posts in the topic are detached, not deleted.
    pub fn delete_topic(&self, id: &str) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("UPDATE posts SET topic_id = NULL WHERE topic_id = ?1", [id])?;
            let deleted = tx.execute("DELETE FROM topics WHERE id = ?1", [id])?;
            if deleted == 0 {
                return Err(StoreError::not_found("topic", id));
            }
            tx.commit()?;
            Ok(())
        })
    }

    // -- Posts --

    /// Create a post, lazily creating and linking any named tags in the
    /// same transaction. Returns the linked tags.
    pub fn create_post(
        &self,
        id: &str,
        title: &str,
        content: &str,
        author_id: Option<&str>,
        topic_id: Option<&str>,
        created_at: &str,
        tag_names: &[String],
    ) -> StoreResult<Vec<TagRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if let Some(author_id) = author_id {
                ensure_user(&tx, author_id)?;
            }
            if let Some(topic_id) = topic_id {
                ensure_topic(&tx, topic_id)?;
            }
            tx.execute(
                "INSERT INTO posts (id, title, content, author_id, topic_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, title, content, author_id, topic_id, created_at],
            )?;
            let mut tags = Vec::with_capacity(tag_names.len());
            for name in tag_names {
                tags.push(link_tag(&tx, id, name)?);
            }
            tx.commit()?;
            Ok(tags)
        })
    }

    pub fn get_post(&self, id: &str) -> StoreResult<PostRow> {
        self.with_conn(|conn| query_post(conn, id)?.ok_or_else(|| StoreError::not_found("post", id)))
    }

    /// Newest first; `filter` is a case-insensitive substring match over
    /// title and content (the search endpoint).
    pub fn list_posts(&self, filter: Option<&str>, limit: u32) -> StoreResult<Vec<PostRow>> {
        self.with_conn(|conn| {
            let rows = match filter {
                Some(q) => {
                    let mut stmt = conn.prepare(
                        "SELECT id, title, content, author_id, topic_id, created_at
                         FROM posts
                         WHERE title LIKE '%' || ?1 || '%' OR content LIKE '%' || ?1 || '%'
                         ORDER BY created_at DESC
                         LIMIT ?2",
                    )?;
                    stmt.query_map(params![q, limit], map_post)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT id, title, content, author_id, topic_id, created_at
                         FROM posts
                         ORDER BY created_at DESC
                         LIMIT ?1",
                    )?;
                    stmt.query_map(params![limit], map_post)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
    }

    pub fn list_posts_for_topic(&self, topic_id: &str) -> StoreResult<Vec<PostRow>> {
        self.with_conn(|conn| {
            ensure_topic(conn, topic_id)?;
            let mut stmt = conn.prepare(
                "SELECT id, title, content, author_id, topic_id, created_at
                 FROM posts
                 WHERE topic_id = ?1
                 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([topic_id], map_post)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Partial merge: absent fields are left unchanged.
    pub fn update_post(
        &self,
        id: &str,
        title: Option<&str>,
        content: Option<&str>,
    ) -> StoreResult<PostRow> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE posts SET title = COALESCE(?2, title), content = COALESCE(?3, content)
                 WHERE id = ?1",
                params![id, title, content],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("post", id));
            }
            query_post(conn, id)?.ok_or_else(|| StoreError::not_found("post", id))
        })
    }

    /// Explicit cascade: comments and tag links go with the post.
    pub fn delete_post(&self, id: &str) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM comments WHERE post_id = ?1", [id])?;
            tx.execute("DELETE FROM post_tags WHERE post_id = ?1", [id])?;
            let deleted = tx.execute("DELETE FROM posts WHERE id = ?1", [id])?;
            if deleted == 0 {
                return Err(StoreError::not_found("post", id));
            }
            tx.commit()?;
            Ok(())
        })
    }

    // -- Comments --

    pub fn create_comment(
        &self,
        id: &str,
        post_id: &str,
        author: &str,
        content: &str,
        created_at: &str,
    ) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            ensure_post(conn, post_id)?;
            conn.execute(
                "INSERT INTO comments (id, post_id, author, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, post_id, author, content, created_at],
            )?;
            Ok(())
        })
    }

    pub fn get_comment(&self, id: &str) -> StoreResult<CommentRow> {
        self.with_conn(|conn| {
            query_comment(conn, id)?.ok_or_else(|| StoreError::not_found("comment", id))
        })
    }

    pub fn list_comments_for_post(&self, post_id: &str) -> StoreResult<Vec<CommentRow>> {
        self.with_conn(|conn| {
            ensure_post(conn, post_id)?;
            let mut stmt = conn.prepare(
                "SELECT id, post_id, author, content, created_at
                 FROM comments
                 WHERE post_id = ?1
                 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([post_id], map_comment)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_comment(&self, id: &str) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute("DELETE FROM comments WHERE id = ?1", [id])?;
            if deleted == 0 {
                return Err(StoreError::not_found("comment", id));
            }
            Ok(())
        })
    }

    // -- Tags --

    /// Idempotent associate: the tag is looked up by name (created lazily
    /// if absent) and linked with INSERT OR IGNORE, so repeating the call
    /// never duplicates the tag or the link.
    pub fn associate_tag(&self, post_id: &str, name: &str) -> StoreResult<TagRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            ensure_post(&tx, post_id)?;
            let tag = link_tag(&tx, post_id, name)?;
            tx.commit()?;
            Ok(tag)
        })
    }

    pub fn get_tag(&self, id: &str) -> StoreResult<TagRow> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name FROM tags WHERE id = ?1")?;
            stmt.query_row([id], map_tag)
                .optional()?
                .ok_or_else(|| StoreError::not_found("tag", id))
        })
    }

    pub fn list_tags(&self) -> StoreResult<Vec<TagRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name FROM tags ORDER BY name")?;
            let rows = stmt
                .query_map([], map_tag)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_tags_for_post(&self, post_id: &str) -> StoreResult<Vec<TagRow>> {
        self.with_conn(|conn| {
            ensure_post(conn, post_id)?;
            query_tags_for_post(conn, post_id)
        })
    }

    /// Batch-fetch tags for a set of post IDs as (post_id, tag) pairs,
    /// so listings avoid a per-post query.
    pub fn get_tags_for_posts(&self, post_ids: &[String]) -> StoreResult<Vec<(String, TagRow)>> {
        if post_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=post_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT pt.post_id, t.id, t.name
                 FROM post_tags pt
                 JOIN tags t ON pt.tag_id = t.id
                 WHERE pt.post_id IN ({})
                 ORDER BY t.name",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = post_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok((
                        row.get(0)?,
                        TagRow {
                            id: row.get(1)?,
                            name: row.get(2)?,
                        },
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Messages --

    pub fn create_message(
        &self,
        id: &str,
        sender_id: &str,
        recipient_id: &str,
        content: &str,
        created_at: &str,
    ) -> StoreResult<MessageRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let sender = query_user(&tx, sender_id)?
                .ok_or_else(|| StoreError::not_found("user", sender_id))?;
            let recipient = query_user(&tx, recipient_id)?
                .ok_or_else(|| StoreError::not_found("user", recipient_id))?;
            tx.execute(
                "INSERT INTO messages (id, sender_id, recipient_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, sender_id, recipient_id, content, created_at],
            )?;
            tx.commit()?;
            Ok(MessageRow {
                id: id.to_string(),
                sender_id: sender_id.to_string(),
                sender_username: sender.username,
                recipient_id: recipient_id.to_string(),
                recipient_username: recipient.username,
                content: content.to_string(),
                created_at: created_at.to_string(),
            })
        })
    }

    /// Both directions of a two-user conversation, newest first.
    pub fn list_conversation(
        &self,
        user_id: &str,
        peer_id: &str,
        limit: u32,
    ) -> StoreResult<Vec<MessageRow>> {
        self.with_conn(|conn| {
            ensure_user(conn, user_id)?;
            ensure_user(conn, peer_id)?;
            // JOIN users twice to carry both usernames in one query
            let mut stmt = conn.prepare(
                "SELECT m.id, m.sender_id, s.username, m.recipient_id, r.username,
                        m.content, m.created_at
                 FROM messages m
                 JOIN users s ON m.sender_id = s.id
                 JOIN users r ON m.recipient_id = r.id
                 WHERE (m.sender_id = ?1 AND m.recipient_id = ?2)
                    OR (m.sender_id = ?2 AND m.recipient_id = ?1)
                 ORDER BY m.created_at DESC
                 LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(params![user_id, peer_id, limit], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Products --

    pub fn create_product(
        &self,
        id: &str,
        name: &str,
        description: Option<&str>,
        price: f64,
    ) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO products (id, name, description, price) VALUES (?1, ?2, ?3, ?4)",
                params![id, name, description, price],
            )?;
            Ok(())
        })
    }

    pub fn get_product(&self, id: &str) -> StoreResult<ProductRow> {
        self.with_conn(|conn| {
            query_product(conn, id)?.ok_or_else(|| StoreError::not_found("product", id))
        })
    }

    pub fn list_products(&self) -> StoreResult<Vec<ProductRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, description, price FROM products ORDER BY name")?;
            let rows = stmt
                .query_map([], map_product)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_product(
        &self,
        id: &str,
        name: Option<&str>,
        description: Option<&str>,
        price: Option<f64>,
    ) -> StoreResult<ProductRow> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE products SET name = COALESCE(?2, name),
                                     description = COALESCE(?3, description),
                                     price = COALESCE(?4, price)
                 WHERE id = ?1",
                params![id, name, description, price],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("product", id));
            }
            query_product(conn, id)?.ok_or_else(|| StoreError::not_found("product", id))
        })
    }

    /// Rejected while any order item still references the product —
    /// deleting it would rewrite order history.
    pub fn delete_product(&self, id: &str) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let referenced: i64 = tx.query_row(
                "SELECT COUNT(*) FROM order_items WHERE product_id = ?1",
                [id],
                |row| row.get(0),
            )?;
            if referenced > 0 {
                return Err(StoreError::Conflict(
                    "product is referenced by existing orders".to_string(),
                ));
            }
            let deleted = tx.execute("DELETE FROM products WHERE id = ?1", [id])?;
            if deleted == 0 {
                return Err(StoreError::not_found("product", id));
            }
            tx.commit()?;
            Ok(())
        })
    }

    // -- Orders --

    /// Create an order with its items in one transaction. `items` is
    /// (product_id, quantity) with quantity already coerced to >= 1.
    pub fn create_order(
        &self,
        id: &str,
        user_id: &str,
        items: &[(String, i64)],
        created_at: &str,
    ) -> StoreResult<Vec<OrderItemRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            ensure_user(&tx, user_id)?;
            tx.execute(
                "INSERT INTO orders (id, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![id, user_id, created_at],
            )?;
            let mut rows = Vec::with_capacity(items.len());
            for (product_id, quantity) in items {
                let product = query_product(&tx, product_id)?
                    .ok_or_else(|| StoreError::not_found("product", product_id))?;
                tx.execute(
                    "INSERT INTO order_items (id, order_id, product_id, quantity)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![Uuid::new_v4().to_string(), id, product_id, quantity],
                )?;
                rows.push(OrderItemRow {
                    order_id: id.to_string(),
                    product_id: product_id.clone(),
                    product_name: product.name,
                    quantity: *quantity,
                });
            }
            tx.commit()?;
            Ok(rows)
        })
    }

    pub fn get_order(&self, id: &str) -> StoreResult<(OrderRow, Vec<OrderItemRow>)> {
        self.with_conn(|conn| {
            let order =
                query_order(conn, id)?.ok_or_else(|| StoreError::not_found("order", id))?;
            let items = query_items_for_orders(conn, std::slice::from_ref(&order.id))?;
            Ok((order, items))
        })
    }

    pub fn list_orders_for_user(
        &self,
        user_id: &str,
    ) -> StoreResult<Vec<(OrderRow, Vec<OrderItemRow>)>> {
        self.with_conn(|conn| {
            ensure_user(conn, user_id)?;
            let mut stmt = conn.prepare(
                "SELECT id, user_id, created_at FROM orders
                 WHERE user_id = ?1
                 ORDER BY created_at DESC",
            )?;
            let orders = stmt
                .query_map([user_id], map_order)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let order_ids: Vec<String> = orders.iter().map(|o| o.id.clone()).collect();
            let items = query_items_for_orders(conn, &order_ids)?;

            let mut by_order: HashMap<String, Vec<OrderItemRow>> = HashMap::new();
            for item in items {
                by_order.entry(item.order_id.clone()).or_default().push(item);
            }

            Ok(orders
                .into_iter()
                .map(|order| {
                    let own = by_order.remove(&order.id).unwrap_or_default();
                    (order, own)
                })
                .collect())
        })
    }

    pub fn delete_order(&self, id: &str) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM order_items WHERE order_id = ?1", [id])?;
            let deleted = tx.execute("DELETE FROM orders WHERE id = ?1", [id])?;
            if deleted == 0 {
                return Err(StoreError::not_found("order", id));
            }
            tx.commit()?;
            Ok(())
        })
    }
}

// -- Row mapping --

fn map_user(row: &rusqlite::Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn map_topic(row: &rusqlite::Row) -> rusqlite::Result<TopicRow> {
    Ok(TopicRow {
        id: row.get(0)?,
        title: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn map_post(row: &rusqlite::Row) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        author_id: row.get(3)?,
        topic_id: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn map_comment(row: &rusqlite::Row) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn map_tag(row: &rusqlite::Row) -> rusqlite::Result<TagRow> {
    Ok(TagRow {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

fn map_message(row: &rusqlite::Row) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        sender_username: row.get(2)?,
        recipient_id: row.get(3)?,
        recipient_username: row.get(4)?,
        content: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn map_product(row: &rusqlite::Row) -> rusqlite::Result<ProductRow> {
    Ok(ProductRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price: row.get(3)?,
    })
}

fn map_order(row: &rusqlite::Row) -> rusqlite::Result<OrderRow> {
    Ok(OrderRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        created_at: row.get(2)?,
    })
}

// -- Single-row lookups --

fn query_user(conn: &Connection, id: &str) -> StoreResult<Option<UserRow>> {
    let mut stmt = conn.prepare("SELECT id, username, created_at FROM users WHERE id = ?1")?;
    stmt.query_row([id], map_user).optional()
}

fn query_topic(conn: &Connection, id: &str) -> StoreResult<Option<TopicRow>> {
    let mut stmt = conn.prepare("SELECT id, title, created_at FROM topics WHERE id = ?1")?;
    stmt.query_row([id], map_topic).optional()
}

fn query_post(conn: &Connection, id: &str) -> StoreResult<Option<PostRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, content, author_id, topic_id, created_at FROM posts WHERE id = ?1",
    )?;
    stmt.query_row([id], map_post).optional()
}

fn query_comment(conn: &Connection, id: &str) -> StoreResult<Option<CommentRow>> {
    let mut stmt = conn
        .prepare("SELECT id, post_id, author, content, created_at FROM comments WHERE id = ?1")?;
    stmt.query_row([id], map_comment).optional()
}

fn query_product(conn: &Connection, id: &str) -> StoreResult<Option<ProductRow>> {
    let mut stmt = conn.prepare("SELECT id, name, description, price FROM products WHERE id = ?1")?;
    stmt.query_row([id], map_product).optional()
}

fn query_order(conn: &Connection, id: &str) -> StoreResult<Option<OrderRow>> {
    let mut stmt = conn.prepare("SELECT id, user_id, created_at FROM orders WHERE id = ?1")?;
    stmt.query_row([id], map_order).optional()
}

fn query_tags_for_post(conn: &Connection, post_id: &str) -> StoreResult<Vec<TagRow>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name FROM tags t
         JOIN post_tags pt ON pt.tag_id = t.id
         WHERE pt.post_id = ?1
         ORDER BY t.name",
    )?;
    let rows = stmt
        .query_map([post_id], map_tag)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Batch-fetch items (with product names) for a set of order IDs.
fn query_items_for_orders(conn: &Connection, order_ids: &[String]) -> StoreResult<Vec<OrderItemRow>> {
    if order_ids.is_empty() {
        return Ok(vec![]);
    }

    let placeholders: Vec<String> = (1..=order_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT oi.order_id, oi.product_id, p.name, oi.quantity
         FROM order_items oi
         JOIN products p ON oi.product_id = p.id
         WHERE oi.order_id IN ({})",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::types::ToSql> = order_ids
        .iter()
        .map(|id| id as &dyn rusqlite::types::ToSql)
        .collect();

    let rows = stmt
        .query_map(params.as_slice(), |row| {
            Ok(OrderItemRow {
                order_id: row.get(0)?,
                product_id: row.get(1)?,
                product_name: row.get(2)?,
                quantity: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

// -- Existence checks --

fn ensure_user(conn: &Connection, id: &str) -> StoreResult<()> {
    exists(conn, "SELECT 1 FROM users WHERE id = ?1", id, "user")
}

fn ensure_topic(conn: &Connection, id: &str) -> StoreResult<()> {
    exists(conn, "SELECT 1 FROM topics WHERE id = ?1", id, "topic")
}

fn ensure_post(conn: &Connection, id: &str) -> StoreResult<()> {
    exists(conn, "SELECT 1 FROM posts WHERE id = ?1", id, "post")
}

fn exists(conn: &Connection, sql: &str, id: &str, entity: &'static str) -> StoreResult<()> {
    conn.query_row(sql, [id], |_| Ok(()))
        .optional()?
        .ok_or_else(|| StoreError::not_found(entity, id))
}

/// Find-or-create the tag by name, then link it to the post. INSERT OR
/// IGNORE on the link keeps repeated associations idempotent.
fn link_tag(conn: &Connection, post_id: &str, name: &str) -> StoreResult<TagRow> {
    let mut stmt = conn.prepare("SELECT id, name FROM tags WHERE name = ?1")?;
    let tag = match stmt.query_row([name], map_tag).optional()? {
        Some(tag) => tag,
        None => {
            let tag = TagRow {
                id: Uuid::new_v4().to_string(),
                name: name.to_string(),
            };
            conn.execute(
                "INSERT INTO tags (id, name) VALUES (?1, ?2)",
                (&tag.id, &tag.name),
            )?;
            tag
        }
    };
    conn.execute(
        "INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?1, ?2)",
        (post_id, &tag.id),
    )?;
    Ok(tag)
}

fn unique_conflict(err: rusqlite::Error, message: &str) -> StoreError {
    let err = StoreError::from(err);
    if err.is_unique_violation() {
        StoreError::Conflict(message.to_string())
    } else {
        err
    }
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> StoreResult<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> StoreResult<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn open_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    fn uid() -> String {
        Uuid::new_v4().to_string()
    }

    const T1: &str = "2026-01-01T10:00:00.000Z";
    const T2: &str = "2026-01-01T10:00:00.500Z";
    const T3: &str = "2026-01-02T09:30:00.000Z";

    #[test]
    fn create_then_get_post_roundtrip() {
        let (_dir, db) = open_db();
        let id = uid();
        db.create_post(&id, "Hello", "World", None, None, T1, &[]).unwrap();

        let post = db.get_post(&id).unwrap();
        assert_eq!(post.id, id);
        assert_eq!(post.title, "Hello");
        assert_eq!(post.content, "World");
        assert_eq!(post.author_id, None);
        assert_eq!(post.created_at, T1);
    }

    #[test]
    fn get_missing_post_is_not_found() {
        let (_dir, db) = open_db();
        let err = db.get_post(&uid()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "post", .. }));
    }

    #[test]
    fn post_delete_cascades_comments_and_tag_links() {
        let (_dir, db) = open_db();
        let post_id = uid();
        db.create_post(&post_id, "Hello", "World", None, None, T1, &["rust".to_string()])
            .unwrap();
        let comment_id = uid();
        db.create_comment(&comment_id, &post_id, "Bob", "Hi", T2).unwrap();

        db.delete_post(&post_id).unwrap();

        assert!(matches!(
            db.get_post(&post_id).unwrap_err(),
            StoreError::NotFound { entity: "post", .. }
        ));
        assert!(matches!(
            db.get_comment(&comment_id).unwrap_err(),
            StoreError::NotFound { entity: "comment", .. }
        ));

        // The tag itself survives; only the link is gone.
        assert_eq!(db.list_tags().unwrap().len(), 1);
        let links: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM post_tags", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(links, 0);
    }

    #[test]
    fn associate_tag_is_idempotent() {
        let (_dir, db) = open_db();
        let post_id = uid();
        db.create_post(&post_id, "Hello", "World", None, None, T1, &[]).unwrap();

        let first = db.associate_tag(&post_id, "python").unwrap();
        let second = db.associate_tag(&post_id, "python").unwrap();
        assert_eq!(first.id, second.id);

        let tags = db.list_tags().unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "python");

        let linked = db.list_tags_for_post(&post_id).unwrap();
        assert_eq!(linked.len(), 1);
    }

    #[test]
    fn list_posts_newest_first() {
        let (_dir, db) = open_db();
        let a = uid();
        let b = uid();
        db.create_post(&a, "First", "a", None, None, T1, &[]).unwrap();
        db.create_post(&b, "Second", "b", None, None, T2, &[]).unwrap();

        let posts = db.list_posts(None, 50).unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, b);
        assert_eq!(posts[1].id, a);
    }

    #[test]
    fn search_matches_title_and_content_case_insensitively() {
        let (_dir, db) = open_db();
        db.create_post(&uid(), "Rust tips", "borrow checker", None, None, T1, &[]).unwrap();
        db.create_post(&uid(), "Cooking", "slow rusted pans", None, None, T2, &[]).unwrap();
        db.create_post(&uid(), "Gardening", "tomatoes", None, None, T3, &[]).unwrap();

        let hits = db.list_posts(Some("RUST"), 50).unwrap();
        assert_eq!(hits.len(), 2);
        // Still newest first within the filtered set.
        assert_eq!(hits[0].title, "Cooking");

        assert!(db.list_posts(Some("nothing"), 50).unwrap().is_empty());
    }

    #[test]
    fn duplicate_username_conflicts_without_partial_write() {
        let (_dir, db) = open_db();
        db.create_user(&uid(), "alice", T1).unwrap();
        let err = db.create_user(&uid(), "alice", T2).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(db.list_users().unwrap().len(), 1);
    }

    #[test]
    fn update_post_merges_partial_fields() {
        let (_dir, db) = open_db();
        let id = uid();
        db.create_post(&id, "Hello", "World", None, None, T1, &[]).unwrap();

        let updated = db.update_post(&id, Some("Hi"), None).unwrap();
        assert_eq!(updated.title, "Hi");
        assert_eq!(updated.content, "World");

        assert!(matches!(
            db.update_post(&uid(), Some("x"), None).unwrap_err(),
            StoreError::NotFound { entity: "post", .. }
        ));
    }

    #[test]
    fn username_update_rechecks_uniqueness() {
        let (_dir, db) = open_db();
        let a = uid();
        db.create_user(&a, "alice", T1).unwrap();
        db.create_user(&uid(), "bob", T2).unwrap();

        let err = db.update_user(&a, Some("bob")).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(db.get_user(&a).unwrap().username, "alice");
    }

    #[test]
    fn comments_require_an_existing_post() {
        let (_dir, db) = open_db();
        let err = db.create_comment(&uid(), &uid(), "Bob", "Hi", T1).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "post", .. }));
    }

    #[test]
    fn messages_join_both_usernames() {
        let (_dir, db) = open_db();
        let alice = uid();
        let bob = uid();
        db.create_user(&alice, "alice", T1).unwrap();
        db.create_user(&bob, "bob", T1).unwrap();

        let sent = db.create_message(&uid(), &alice, &bob, "hi bob", T2).unwrap();
        assert_eq!(sent.sender_username, "alice");
        assert_eq!(sent.recipient_username, "bob");
        db.create_message(&uid(), &bob, &alice, "hi alice", T3).unwrap();

        // Both directions, newest first, from either participant's side.
        let convo = db.list_conversation(&bob, &alice, 50).unwrap();
        assert_eq!(convo.len(), 2);
        assert_eq!(convo[0].content, "hi alice");
        assert_eq!(convo[1].content, "hi bob");
    }

    #[test]
    fn message_to_unknown_user_is_not_found() {
        let (_dir, db) = open_db();
        let alice = uid();
        db.create_user(&alice, "alice", T1).unwrap();
        let err = db.create_message(&uid(), &alice, &uid(), "hi", T2).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "user", .. }));
    }

    #[test]
    fn order_roundtrip_with_product_names() {
        let (_dir, db) = open_db();
        let user = uid();
        db.create_user(&user, "carol", T1).unwrap();
        let widget = uid();
        let gadget = uid();
        db.create_product(&widget, "Widget", Some("a widget"), 9.99).unwrap();
        db.create_product(&gadget, "Gadget", None, 19.5).unwrap();

        let order_id = uid();
        let items = db
            .create_order(
                &order_id,
                &user,
                &[(widget.clone(), 2), (gadget.clone(), 1)],
                T2,
            )
            .unwrap();
        assert_eq!(items.len(), 2);

        let (order, items) = db.get_order(&order_id).unwrap();
        assert_eq!(order.user_id, user);
        assert_eq!(items.len(), 2);
        let names: Vec<&str> = items.iter().map(|i| i.product_name.as_str()).collect();
        assert!(names.contains(&"Widget") && names.contains(&"Gadget"));

        let orders = db.list_orders_for_user(&user).unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].1.len(), 2);
    }

    #[test]
    fn order_with_unknown_product_rolls_back() {
        let (_dir, db) = open_db();
        let user = uid();
        db.create_user(&user, "carol", T1).unwrap();

        let order_id = uid();
        let err = db
            .create_order(&order_id, &user, &[(uid(), 1)], T2)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "product", .. }));

        // Nothing committed: the order row must not exist.
        assert!(matches!(
            db.get_order(&order_id).unwrap_err(),
            StoreError::NotFound { entity: "order", .. }
        ));
    }

    #[test]
    fn ordered_product_cannot_be_deleted() {
        let (_dir, db) = open_db();
        let user = uid();
        db.create_user(&user, "carol", T1).unwrap();
        let product = uid();
        db.create_product(&product, "Widget", None, 9.99).unwrap();
        db.create_order(&uid(), &user, &[(product.clone(), 1)], T2).unwrap();

        let err = db.delete_product(&product).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(db.get_product(&product).is_ok());
    }

    #[test]
    fn deleting_user_detaches_posts_and_removes_owned_records() {
        let (_dir, db) = open_db();
        let alice = uid();
        let bob = uid();
        db.create_user(&alice, "alice", T1).unwrap();
        db.create_user(&bob, "bob", T1).unwrap();

        let post_id = uid();
        db.create_post(&post_id, "Hello", "World", Some(&alice), None, T2, &[]).unwrap();
        db.create_message(&uid(), &alice, &bob, "hi", T2).unwrap();
        let product = uid();
        db.create_product(&product, "Widget", None, 1.0).unwrap();
        let order_id = uid();
        db.create_order(&order_id, &alice, &[(product, 1)], T3).unwrap();

        db.delete_user(&alice).unwrap();

        let post = db.get_post(&post_id).unwrap();
        assert_eq!(post.author_id, None);
        assert!(matches!(
            db.get_order(&order_id).unwrap_err(),
            StoreError::NotFound { entity: "order", .. }
        ));
        let messages: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(messages, 0);
    }

    #[test]
    fn topic_delete_detaches_posts() {
        let (_dir, db) = open_db();
        let topic = uid();
        db.create_topic(&topic, "General", T1).unwrap();
        let post_id = uid();
        db.create_post(&post_id, "Hello", "World", None, Some(&topic), T2, &[]).unwrap();
        assert_eq!(db.list_posts_for_topic(&topic).unwrap().len(), 1);

        db.delete_topic(&topic).unwrap();
        assert_eq!(db.get_post(&post_id).unwrap().topic_id, None);
        assert!(matches!(
            db.list_posts_for_topic(&topic).unwrap_err(),
            StoreError::NotFound { entity: "topic", .. }
        ));
    }

    #[test]
    fn schema_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("test.db");
        let id = uid();
        {
            let db = Database::open(&path).unwrap();
            db.create_post(&id, "Hello", "World", None, None, T1, &[]).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_post(&id).unwrap().title, "Hello");
    }
}
