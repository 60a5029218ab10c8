/// Database row types — these map directly to SQLite rows.
/// Distinct from the quill-types API DTOs to keep the DB layer independent.

#[derive(Debug)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub created_at: String,
}

#[derive(Debug)]
pub struct TopicRow {
    pub id: String,
    pub title: String,
    pub created_at: String,
}

#[derive(Debug)]
pub struct PostRow {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author_id: Option<String>,
    pub topic_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug)]
pub struct CommentRow {
    pub id: String,
    pub post_id: String,
    pub author: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug)]
pub struct TagRow {
    pub id: String,
    pub name: String,
}

#[derive(Debug)]
pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub recipient_id: String,
    pub recipient_username: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug)]
pub struct ProductRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
}

#[derive(Debug)]
pub struct OrderRow {
    pub id: String,
    pub user_id: String,
    pub created_at: String,
}

#[derive(Debug)]
pub struct OrderItemRow {
    pub order_id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
}
