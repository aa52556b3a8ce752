use std::time::Duration;

use anyhow::{bail, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::USER_AGENT;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://jsonplaceholder.typicode.com";

/// Failure classification for every client operation. Screens only ever see
/// these variants, never raw transport errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("api: {0} is required")]
    InvalidArgument(&'static str),
    #[error("api: {resource} {id} not found")]
    NotFound { resource: &'static str, id: i64 },
    #[error("api: unexpected status {status} for {path}")]
    Http { status: StatusCode, path: String },
    #[error("api: request failed")]
    Network(#[from] reqwest::Error),
    #[error("api: could not decode response for {path}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: String,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("feed client user agent required");
        }

        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Url::parse(&base)?;
        let base_url = base.trim_end_matches('/').to_string();

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(20)))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    pub fn list_posts(&self) -> Result<Vec<Post>, Error> {
        self.get_json("/posts")
    }

    pub fn get_post(&self, id: i64) -> Result<Post, Error> {
        require_id(id, "post id")?;
        self.get_json(&format!("/posts/{id}"))
            .map_err(|err| mark_not_found(err, "post", id))
    }

    pub fn list_users(&self) -> Result<Vec<User>, Error> {
        self.get_json("/users")
    }

    pub fn get_user(&self, id: i64) -> Result<User, Error> {
        require_id(id, "user id")?;
        self.get_json(&format!("/users/{id}"))
            .map_err(|err| mark_not_found(err, "user", id))
    }

    pub fn posts_by_user(&self, user_id: i64) -> Result<Vec<Post>, Error> {
        require_id(user_id, "user id")?;
        self.get_json(&format!("/users/{user_id}/posts"))
    }

    pub fn comments_by_post(&self, post_id: i64) -> Result<Vec<Comment>, Error> {
        require_id(post_id, "post id")?;
        self.get_json(&format!("/posts/{post_id}/comments"))
    }

    fn get_json<T>(&self, path: &str) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let result = self.fetch(&url, path);
        if let Err(err) = &result {
            warn!(%err, path, "feed request failed");
        }
        result
    }

    fn fetch<T>(&self, url: &str, path: &str) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        let resp = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            // A non-success status is never valid data, even when the body
            // happens to parse.
            return Err(Error::Http {
                status,
                path: path.to_string(),
            });
        }
        let body = resp.text()?;
        serde_json::from_str(&body).map_err(|source| Error::Decode {
            path: path.to_string(),
            source,
        })
    }
}

fn require_id(id: i64, what: &'static str) -> Result<(), Error> {
    if id <= 0 {
        return Err(Error::InvalidArgument(what));
    }
    Ok(())
}

fn mark_not_found(err: Error, resource: &'static str, id: i64) -> Error {
    match err {
        Error::Http { status, .. } if status == StatusCode::NOT_FOUND => {
            Error::NotFound { resource, id }
        }
        other => other,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: i64,
    #[serde(rename = "userId")]
    pub user_id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub company: Company,
    #[serde(default)]
    pub address: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Company {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Address {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub suite: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub zipcode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: i64,
    #[serde(rename = "postId")]
    pub post_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::thread;

    fn test_client(base_url: &str) -> Client {
        Client::new(ClientConfig {
            user_agent: "feedr-test/0.1".into(),
            base_url: Some(base_url.to_string()),
            ..ClientConfig::default()
        })
        .unwrap()
    }

    /// Serves each configured path once, then shuts down after `hits`
    /// requests. Unknown paths get a 404.
    fn serve(routes: &[(&str, u16, &str)], hits: usize) -> (String, thread::JoinHandle<()>) {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let base = format!("http://{}", server.server_addr());
        let routes: HashMap<String, (u16, String)> = routes
            .iter()
            .map(|(path, status, body)| ((*path).to_string(), (*status, (*body).to_string())))
            .collect();
        let handle = thread::spawn(move || {
            for _ in 0..hits {
                let Ok(request) = server.recv() else { return };
                let (status, body) = routes
                    .get(request.url())
                    .cloned()
                    .unwrap_or((404, "{}".to_string()));
                let response = tiny_http::Response::from_string(body)
                    .with_status_code(tiny_http::StatusCode(status));
                let _ = request.respond(response);
            }
        });
        (base, handle)
    }

    #[test]
    fn rejects_missing_user_agent() {
        let result = Client::new(ClientConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn get_post_validates_id_before_any_request() {
        // An unroutable base guarantees a Network error if a request were
        // actually issued.
        let client = test_client("http://127.0.0.1:9/");
        match client.get_post(0) {
            Err(Error::InvalidArgument(what)) => assert_eq!(what, "post id"),
            other => panic!("expected InvalidArgument, got {other:?}"),
        }
        assert!(matches!(
            client.get_post(-3),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn get_user_validates_id_before_any_request() {
        let client = test_client("http://127.0.0.1:9/");
        assert!(matches!(
            client.get_user(0),
            Err(Error::InvalidArgument("user id"))
        ));
    }

    #[test]
    fn list_posts_decodes_collection() {
        let body = r#"[
            {"userId": 1, "id": 1, "title": "first", "body": "alpha"},
            {"userId": 2, "id": 2, "title": "second", "body": "beta"}
        ]"#;
        let (base, handle) = serve(&[("/posts", 200, body)], 1);
        let client = test_client(&base);
        let posts = client.list_posts().unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, 1);
        assert_eq!(posts[1].user_id, 2);
        handle.join().unwrap();
    }

    #[test]
    fn get_post_returns_record_with_requested_id() {
        let body = r#"{"userId": 3, "id": 7, "title": "t", "body": "b"}"#;
        let (base, handle) = serve(&[("/posts/7", 200, body)], 1);
        let client = test_client(&base);
        let post = client.get_post(7).unwrap();
        assert_eq!(post.id, 7);
        assert_eq!(post.user_id, 3);
        handle.join().unwrap();
    }

    #[test]
    fn get_user_maps_missing_record_to_not_found() {
        let (base, handle) = serve(&[], 1);
        let client = test_client(&base);
        match client.get_user(999_999) {
            Err(Error::NotFound { resource, id }) => {
                assert_eq!(resource, "user");
                assert_eq!(id, 999_999);
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
        handle.join().unwrap();
    }

    #[test]
    fn non_success_status_is_never_valid_data() {
        let (base, handle) = serve(&[("/posts", 500, "[]")], 1);
        let client = test_client(&base);
        match client.list_posts() {
            Err(Error::Http { status, .. }) => assert_eq!(status.as_u16(), 500),
            other => panic!("expected Http error, got {other:?}"),
        }
        handle.join().unwrap();
    }

    #[test]
    fn unparseable_body_is_a_decode_error() {
        let (base, handle) = serve(&[("/users", 200, "<html>oops</html>")], 1);
        let client = test_client(&base);
        assert!(matches!(
            client.list_users(),
            Err(Error::Decode { .. })
        ));
        handle.join().unwrap();
    }

    #[test]
    fn posts_by_user_hits_nested_route() {
        let body = r#"[{"userId": 4, "id": 31, "title": "mine", "body": ""}]"#;
        let (base, handle) = serve(&[("/users/4/posts", 200, body)], 1);
        let client = test_client(&base);
        let posts = client.posts_by_user(4).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].user_id, 4);
        handle.join().unwrap();
    }

    #[test]
    fn comments_by_post_decodes_collection() {
        let body = r#"[
            {"postId": 1, "id": 10, "name": "n", "email": "e@x.dev", "body": "hi"},
            {"postId": 1, "id": 11, "name": "m", "email": "m@x.dev", "body": "yo"}
        ]"#;
        let (base, handle) = serve(&[("/posts/1/comments", 200, body)], 1);
        let client = test_client(&base);
        let comments = client.comments_by_post(1).unwrap();
        assert_eq!(comments.len(), 2);
        assert!(comments.iter().all(|c| c.post_id == 1));
        handle.join().unwrap();
    }

    #[test]
    fn get_user_decodes_nested_company_and_address() {
        let body = r#"{
            "id": 2,
            "name": "Ervin Howell",
            "email": "Shanna@melissa.tv",
            "phone": "010-692-6593",
            "website": "anastasia.net",
            "company": {"name": "Deckow-Crist", "catchPhrase": "ignored"},
            "address": {"street": "Victor Plains", "suite": "Suite 879",
                        "city": "Wisokyburgh", "zipcode": "90566-7771",
                        "geo": {"lat": "-43.9509", "lng": "-34.4618"}}
        }"#;
        let (base, handle) = serve(&[("/users/2", 200, body)], 1);
        let client = test_client(&base);
        let user = client.get_user(2).unwrap();
        assert_eq!(user.id, 2);
        assert_eq!(user.company.name, "Deckow-Crist");
        assert_eq!(user.address.city, "Wisokyburgh");
        handle.join().unwrap();
    }

    #[test]
    fn posts_by_user_is_idempotent() {
        let body = r#"[{"userId": 5, "id": 41, "title": "same", "body": "twice"}]"#;
        let (base, handle) = serve(&[("/users/5/posts", 200, body)], 2);
        let client = test_client(&base);
        let first = client.posts_by_user(5).unwrap();
        let second = client.posts_by_user(5).unwrap();
        assert_eq!(first, second);
        handle.join().unwrap();
    }
}
