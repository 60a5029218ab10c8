//! Pure validation over the request DTOs.
//!
//! Each function returns every field error at once so a 400 response can
//! re-present the whole form, not just the first failure.

use crate::api::{
    CreateCommentRequest, CreateOrderRequest, CreatePostRequest, CreateProductRequest,
    CreateTopicRequest, CreateUserRequest, FieldError, SendMessageRequest,
};

const MAX_USERNAME_LEN: usize = 50;

fn require(errors: &mut Vec<FieldError>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, "must not be empty"));
    }
}

pub fn create_user(req: &CreateUserRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    require(&mut errors, "username", &req.username);
    if req.username.len() > MAX_USERNAME_LEN {
        errors.push(FieldError::new("username", "too long"));
    }
    errors
}

pub fn update_user(username: &Option<String>) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if let Some(username) = username {
        require(&mut errors, "username", username);
        if username.len() > MAX_USERNAME_LEN {
            errors.push(FieldError::new("username", "too long"));
        }
    }
    errors
}

pub fn create_topic(req: &CreateTopicRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    require(&mut errors, "title", &req.title);
    errors
}

pub fn update_topic(title: &Option<String>) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if let Some(title) = title {
        require(&mut errors, "title", title);
    }
    errors
}

pub fn create_post(req: &CreatePostRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    require(&mut errors, "title", &req.title);
    require(&mut errors, "content", &req.content);
    errors
}

pub fn update_post(title: &Option<String>, content: &Option<String>) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if let Some(title) = title {
        require(&mut errors, "title", title);
    }
    if let Some(content) = content {
        require(&mut errors, "content", content);
    }
    errors
}

pub fn create_comment(req: &CreateCommentRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    require(&mut errors, "author", &req.author);
    require(&mut errors, "content", &req.content);
    errors
}

pub fn attach_tag(name: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();
    require(&mut errors, "name", name);
    errors
}

pub fn send_message(req: &SendMessageRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    require(&mut errors, "content", &req.content);
    errors
}

pub fn create_product(req: &CreateProductRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    require(&mut errors, "name", &req.name);
    if !req.price.is_finite() || req.price < 0.0 {
        errors.push(FieldError::new("price", "must be a non-negative number"));
    }
    errors
}

pub fn update_product(name: &Option<String>, price: Option<f64>) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if let Some(name) = name {
        require(&mut errors, "name", name);
    }
    if let Some(price) = price {
        if !price.is_finite() || price < 0.0 {
            errors.push(FieldError::new("price", "must be a non-negative number"));
        }
    }
    errors
}

pub fn create_order(req: &CreateOrderRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if req.items.is_empty() {
        errors.push(FieldError::new("items", "order needs at least one item"));
    }
    errors
}

/// Order item quantities default to 1 and are clamped up to 1.
pub fn coerce_quantity(quantity: Option<i64>) -> i64 {
    quantity.unwrap_or(1).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn post_requires_title_and_content() {
        let req = CreatePostRequest {
            title: "  ".to_string(),
            content: String::new(),
            author_id: None,
            topic_id: None,
            tags: vec![],
        };
        let errors = create_post(&req);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "title");
        assert_eq!(errors[1].field, "content");
    }

    #[test]
    fn valid_post_passes() {
        let req = CreatePostRequest {
            title: "Hello".to_string(),
            content: "World".to_string(),
            author_id: None,
            topic_id: None,
            tags: vec!["rust".to_string()],
        };
        assert!(create_post(&req).is_empty());
    }

    #[test]
    fn username_length_capped() {
        let req = CreateUserRequest {
            username: "x".repeat(51),
        };
        let errors = create_user(&req);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "too long");
    }

    #[test]
    fn product_price_must_be_finite_and_non_negative() {
        for price in [f64::NAN, f64::INFINITY, -0.01] {
            let req = CreateProductRequest {
                name: "Widget".to_string(),
                description: None,
                price,
            };
            assert_eq!(create_product(&req).len(), 1, "price {price} should fail");
        }
    }

    #[test]
    fn empty_order_rejected() {
        let req = CreateOrderRequest {
            user_id: Uuid::new_v4(),
            items: vec![],
        };
        assert_eq!(create_order(&req).len(), 1);
    }

    #[test]
    fn quantity_coercion() {
        assert_eq!(coerce_quantity(None), 1);
        assert_eq!(coerce_quantity(Some(0)), 1);
        assert_eq!(coerce_quantity(Some(-5)), 1);
        assert_eq!(coerce_quantity(Some(3)), 3);
    }

    #[test]
    fn partial_update_skips_absent_fields() {
        assert!(update_user(&None).is_empty());
        assert!(update_product(&None, None).is_empty());
        assert_eq!(update_product(&Some(String::new()), None).len(), 1);
    }
}
