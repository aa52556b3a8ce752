use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::api;

pub trait FeedService: Send + Sync {
    fn list_posts(&self) -> Result<Vec<api::Post>, api::Error>;
    fn posts_by_user(&self, user_id: i64) -> Result<Vec<api::Post>, api::Error>;
}

pub trait UserService: Send + Sync {
    fn list_users(&self) -> Result<Vec<api::User>, api::Error>;
    fn get_user(&self, id: i64) -> Result<api::User, api::Error>;
}

pub trait PostService: Send + Sync {
    fn get_post(&self, id: i64) -> Result<api::Post, api::Error>;
}

pub trait CommentService: Send + Sync {
    fn comments_for_post(&self, post_id: i64) -> Result<Vec<api::Comment>, api::Error>;
}

/// Case-insensitive substring match on the user's display name. An empty or
/// whitespace-only query matches nobody; the caller treats that as "not
/// searching" and must not have fetched in the first place.
pub fn filter_users(users: &[api::User], query: &str) -> Vec<api::User> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    users
        .iter()
        .filter(|user| user.name.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

pub struct ApiFeedService {
    client: Arc<api::Client>,
}

impl ApiFeedService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl FeedService for ApiFeedService {
    fn list_posts(&self) -> Result<Vec<api::Post>, api::Error> {
        self.client.list_posts()
    }

    fn posts_by_user(&self, user_id: i64) -> Result<Vec<api::Post>, api::Error> {
        self.client.posts_by_user(user_id)
    }
}

pub struct ApiUserService {
    client: Arc<api::Client>,
}

impl ApiUserService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl UserService for ApiUserService {
    fn list_users(&self) -> Result<Vec<api::User>, api::Error> {
        self.client.list_users()
    }

    fn get_user(&self, id: i64) -> Result<api::User, api::Error> {
        self.client.get_user(id)
    }
}

pub struct ApiPostService {
    client: Arc<api::Client>,
}

impl ApiPostService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl PostService for ApiPostService {
    fn get_post(&self, id: i64) -> Result<api::Post, api::Error> {
        self.client.get_post(id)
    }
}

pub struct ApiCommentService {
    client: Arc<api::Client>,
}

impl ApiCommentService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl CommentService for ApiCommentService {
    fn comments_for_post(&self, post_id: i64) -> Result<Vec<api::Comment>, api::Error> {
        self.client.comments_by_post(post_id)
    }
}

fn service_error(path: &str) -> api::Error {
    api::Error::Http {
        status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        path: path.to_string(),
    }
}

#[derive(Default)]
pub struct MockFeedService {
    pub posts: Vec<api::Post>,
    pub user_posts: Vec<api::Post>,
    pub fail: bool,
}

impl FeedService for MockFeedService {
    fn list_posts(&self) -> Result<Vec<api::Post>, api::Error> {
        if self.fail {
            return Err(service_error("/posts"));
        }
        Ok(self.posts.clone())
    }

    fn posts_by_user(&self, user_id: i64) -> Result<Vec<api::Post>, api::Error> {
        if self.fail {
            return Err(service_error("/users/posts"));
        }
        Ok(self
            .user_posts
            .iter()
            .filter(|post| post.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MockUserService {
    pub users: Vec<api::User>,
    pub fail: bool,
    pub list_calls: AtomicUsize,
}

impl MockUserService {
    pub fn list_call_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl UserService for MockUserService {
    fn list_users(&self) -> Result<Vec<api::User>, api::Error> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(service_error("/users"));
        }
        Ok(self.users.clone())
    }

    fn get_user(&self, id: i64) -> Result<api::User, api::Error> {
        if self.fail {
            return Err(service_error("/users"));
        }
        self.users
            .iter()
            .find(|user| user.id == id)
            .cloned()
            .ok_or(api::Error::NotFound {
                resource: "user",
                id,
            })
    }
}

#[derive(Default)]
pub struct MockPostService {
    pub posts: Vec<api::Post>,
    pub fail: bool,
}

impl PostService for MockPostService {
    fn get_post(&self, id: i64) -> Result<api::Post, api::Error> {
        if self.fail {
            return Err(service_error("/posts"));
        }
        self.posts
            .iter()
            .find(|post| post.id == id)
            .cloned()
            .ok_or(api::Error::NotFound {
                resource: "post",
                id,
            })
    }
}

#[derive(Default)]
pub struct MockCommentService {
    pub comments: Vec<api::Comment>,
    pub fail: bool,
}

impl CommentService for MockCommentService {
    fn comments_for_post(&self, post_id: i64) -> Result<Vec<api::Comment>, api::Error> {
        if self.fail {
            return Err(service_error("/posts/comments"));
        }
        Ok(self
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, name: &str) -> api::User {
        api::User {
            id,
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            phone: String::new(),
            website: String::new(),
            company: api::Company::default(),
            address: api::Address::default(),
        }
    }

    #[test]
    fn filter_users_matches_substring_case_insensitively() {
        let users = vec![
            user(1, "Leanne Graham"),
            user(2, "Ervin Howell"),
            user(3, "Clementine Bauch"),
        ];
        let hits = filter_users(&users, "LEA");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 1);

        let hits = filter_users(&users, "e");
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn filter_users_result_is_exact_subset() {
        let users = vec![user(1, "Ana"), user(2, "Bruno"), user(3, "Mariana")];
        let hits = filter_users(&users, "ana");
        let expected: Vec<i64> = users
            .iter()
            .filter(|u| u.name.to_lowercase().contains("ana"))
            .map(|u| u.id)
            .collect();
        assert_eq!(hits.iter().map(|u| u.id).collect::<Vec<_>>(), expected);
    }

    #[test]
    fn filter_users_blank_query_matches_nobody() {
        let users = vec![user(1, "Ana")];
        assert!(filter_users(&users, "").is_empty());
        assert!(filter_users(&users, "   ").is_empty());
    }

    #[test]
    fn mock_user_service_counts_list_calls() {
        let service = MockUserService {
            users: vec![user(1, "Ana")],
            ..Default::default()
        };
        assert_eq!(service.list_call_count(), 0);
        service.list_users().unwrap();
        service.list_users().unwrap();
        assert_eq!(service.list_call_count(), 2);
    }
}
