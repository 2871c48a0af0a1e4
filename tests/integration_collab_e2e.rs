use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use collab_hub::{
    config::Config,
    models::{
        referral::ReferralLink,
        task::{Difficulty, Task},
    },
    repositories::Store,
    router::build_router,
    state::AppState,
};

// Shared test context
struct TestContext {
    state: AppState,
    base_url: String,
}

impl TestContext {
    async fn start() -> Self {
        let state = AppState::in_memory(Config::default());
        let app = build_router(state.clone()).unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            state,
            base_url: format!("http://{}", addr),
        }
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .unwrap()
    }

    fn get_timestamp() -> u128 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    }

    async fn seed_task(&self, category: &str) -> Task {
        self.state
            .store
            .create_task(Task {
                id: Uuid::new_v4(),
                title: "Two sum".to_string(),
                category: category.to_string(),
                difficulty: Difficulty::Easy,
                content: "Find two numbers that add up to a target.".to_string(),
                is_deleted: false,
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    async fn join(&self, client: &reqwest::Client, name: &str, category: &str) -> reqwest::Response {
        client
            .post(format!("{}/api/collabs/join", self.base_url))
            .json(&json!({
                "user": {
                    "email": format!("{}_{}@example.com", name, Self::get_timestamp()),
                    "password": "SecurePass123!@#",
                    "userName": name
                },
                "task": { "category": category, "difficulty": "easy" }
            }))
            .send()
            .await
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_chat_and_search() {
        let context = TestContext::start().await;
        context.seed_task("arrays").await;

        // Step 1: First user creates the collab
        let alice = TestContext::client();
        let response = context.join(&alice, "alice", "arrays").await;
        assert_eq!(response.status().as_u16(), 201, "Join failed");
        let cookies = response.cookies().collect::<Vec<_>>();
        assert!(cookies.iter().any(|c| c.name() == "refreshToken" && c.http_only()));
        let body: Value = response.json().await.unwrap();
        let hash = body["collab"]["hash"].as_str().unwrap().to_string();
        let alice_token = body["accessToken"].as_str().unwrap().to_string();
        assert_eq!(body["collab"]["members"].as_array().unwrap().len(), 1);
        assert!(body["user"].get("passwordHash").is_none());

        // Step 2: Second user is matched into the same collab
        let bob = TestContext::client();
        let body: Value = context.join(&bob, "bob", "arrays").await.json().await.unwrap();
        assert_eq!(body["collab"]["hash"], hash);
        assert_eq!(body["collab"]["members"].as_array().unwrap().len(), 2);
        let bob_token = body["accessToken"].as_str().unwrap().to_string();

        // Step 3: Alice posts, Bob searches
        let response = alice
            .post(format!("{}/api/collabs/{}/messages", context.base_url, hash))
            .bearer_auth(&alice_token)
            .json(&json!({ "content": "let's use a hash map" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201, "Posting failed");
        let message: Value = response.json().await.unwrap();
        assert_eq!(message["isEdited"], false);
        let message_id = message["id"].as_str().unwrap().to_string();

        let found: Value = bob
            .get(format!("{}/api/collabs/{}/messages/search", context.base_url, hash))
            .query(&[("query", "hash")])
            .bearer_auth(&bob_token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(found.as_array().unwrap().len(), 1);

        // Step 4: Bob may not delete Alice's message
        let response = bob
            .delete(format!("{}/api/messages/{}", context.base_url, message_id))
            .bearer_auth(&bob_token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 403);

        // Step 5: An outsider may not search
        let outsider = TestContext::client();
        let response = outsider
            .post(format!("{}/api/auth/register", context.base_url))
            .json(&json!({
                "email": format!("outsider_{}@example.com", TestContext::get_timestamp()),
                "password": "SecurePass123!@#",
                "userName": "outsider"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201, "Registration failed");
        let body: Value = response.json().await.unwrap();
        let outsider_token = body["accessToken"].as_str().unwrap().to_string();

        let response = outsider
            .get(format!("{}/api/collabs/{}/messages/search", context.base_url, hash))
            .query(&[("query", "hash")])
            .bearer_auth(&outsider_token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 403);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["kind"], "forbidden");
    }

    #[tokio::test]
    async fn test_invite_and_refresh() {
        let context = TestContext::start().await;
        context.seed_task("graphs").await;

        let host = TestContext::client();
        let body: Value = context.join(&host, "host", "graphs").await.json().await.unwrap();
        let hash = body["collab"]["hash"].as_str().unwrap().to_string();

        context
            .state
            .store
            .create_referral(ReferralLink {
                token: "join-us".to_string(),
                session_hash: hash.clone(),
                expires_at: Utc::now() + Duration::hours(1),
            })
            .await
            .unwrap();

        // Step 1: A guest follows the invite
        let guest = TestContext::client();
        let response = guest
            .post(format!("{}/api/collabs/invite", context.base_url))
            .json(&json!({ "referral": "join-us" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201, "Invite failed");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["collab"]["hash"], hash);
        assert_eq!(body["collab"]["members"].as_array().unwrap().len(), 2);

        // Step 2: An unknown invite is refused
        let response = guest
            .post(format!("{}/api/collabs/invite", context.base_url))
            .json(&json!({ "referral": "nope" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);

        // Step 3: The refresh cookie yields a working access token
        let response = guest
            .post(format!("{}/api/auth/refresh", context.base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200, "Refresh failed");
        let body: Value = response.json().await.unwrap();
        let token = body["accessToken"].as_str().unwrap().to_string();

        let response = guest
            .get(format!("{}/api/collabs/{}", context.base_url, hash))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["task"]["category"], "graphs");
    }

    #[tokio::test]
    async fn test_protected_routes_require_a_token() {
        let context = TestContext::start().await;

        let response = TestContext::client()
            .get(format!("{}/api/collabs/0a1b2c3d", context.base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 401);

        let response = TestContext::client()
            .get(format!("{}/api/collabs/0a1b2c3d", context.base_url))
            .bearer_auth("not-a-token")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 401);
    }

    #[tokio::test]
    async fn test_tasks_profiles_and_logout() {
        let context = TestContext::start().await;
        let email = format!("author_{}@example.com", TestContext::get_timestamp());

        // Step 1: Register an author
        let author = TestContext::client();
        let response = author
            .post(format!("{}/api/auth/register", context.base_url))
            .json(&json!({
                "email": email,
                "password": "SecurePass123!@#",
                "userName": "author"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201, "Registration failed");
        let body: Value = response.json().await.unwrap();
        let token = body["accessToken"].as_str().unwrap().to_string();
        let user_id = body["user"]["id"].as_str().unwrap().to_string();

        // Step 2: Publish a task over HTTP and fetch it back
        let response = author
            .post(format!("{}/api/tasks", context.base_url))
            .bearer_auth(&token)
            .json(&json!({
                "title": "Top k frequent",
                "category": "heaps",
                "difficulty": "medium",
                "content": "Return the k most frequent elements."
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201, "Task creation failed");
        let task: Value = response.json().await.unwrap();
        assert_eq!(task["isDeleted"], false);
        let task_id = task["id"].as_str().unwrap().to_string();

        let response = author
            .get(format!("{}/api/tasks/{}", context.base_url, task_id))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);

        // Step 3: A join for that descriptor lands on the new task
        let joiner = TestContext::client();
        let response = joiner
            .post(format!("{}/api/collabs/join", context.base_url))
            .json(&json!({
                "user": {
                    "email": format!("joiner_{}@example.com", TestContext::get_timestamp()),
                    "password": "SecurePass123!@#",
                    "userName": "joiner"
                },
                "task": { "category": "heaps", "difficulty": "medium" }
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201, "Join failed");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["collab"]["task"]["id"], task_id);
        let joiner_id = body["user"]["id"].as_str().unwrap().to_string();

        // Step 4: Profiles can be read by anyone, edited only by their owner
        let response = author
            .patch(format!("{}/api/users/{}", context.base_url, user_id))
            .bearer_auth(&token)
            .json(&json!({ "userName": "the author" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200, "Profile update failed");

        let found: Value = author
            .get(format!("{}/api/users", context.base_url))
            .query(&[("email", email.as_str())])
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(found["userName"], "the author");
        assert!(found.get("passwordHash").is_none());

        let response = author
            .patch(format!("{}/api/users/{}", context.base_url, joiner_id))
            .bearer_auth(&token)
            .json(&json!({ "userName": "hijacked" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 403);

        // Step 5: After logout the refresh cookie no longer works
        let response = author
            .post(format!("{}/api/auth/logout", context.base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200, "Logout failed");

        let response = author
            .post(format!("{}/api/auth/refresh", context.base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 401);
    }
}
