use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, PercentEncode, CONTROLS};
use reqwest::cookie::Jar;
use serde::Serialize;

use crate::error::Result;
use crate::http::HttpClient;
use crate::types::{
    Bet, CreateGroupRequest, CreatePoolRequest, GrantPointsRequest, Group, GroupId, GroupStats,
    HistoryPage, HistoryQuery, InviteCodeResponse, JoinGroupRequest, LeaderboardEntry,
    LoginRequest, OptionId, PlaceBetRequest, Pool, PoolId, PoolStatus, RegisterRequest,
    ResolvePoolRequest, User, UserId,
};

/// Characters escaped inside one path segment, matching `url`'s own set
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'%');

fn segment(id: &str) -> PercentEncode<'_> {
    utf8_percent_encode(id, PATH_SEGMENT)
}

#[derive(Serialize)]
struct StatusFilter {
    status: &'static str,
}

/// Client for the Bets REST API
///
/// Authentication rides on the session cookie kept in the shared jar; the
/// same jar is handed to the WebSocket connector.
#[derive(Clone)]
pub struct ApiClient {
    http_client: HttpClient,
}

impl ApiClient {
    /// Create a new ApiClient
    ///
    /// # Arguments
    /// * `base_url` - API root, e.g. "https://bets.example.com/api"
    /// * `cookies` - Cookie jar holding the session credential
    pub fn new(base_url: impl Into<String>, cookies: Arc<Jar>) -> Result<Self> {
        Ok(Self {
            http_client: HttpClient::new(base_url, cookies)?,
        })
    }

    // Auth

    /// Current user; fails with `Unauthorized` when not logged in
    pub async fn me(&self) -> Result<User> {
        self.http_client.get("/auth/me").await
    }

    pub async fn register(&self, email: &str, password: &str, name: &str) -> Result<User> {
        let body = RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            name: name.to_string(),
        };
        self.http_client.post("/auth/register", &body).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.http_client.post("/auth/login", &body).await
    }

    pub async fn logout(&self) -> Result<()> {
        self.http_client.post_empty("/auth/logout").await
    }

    // Groups

    /// Groups the current user belongs to
    pub async fn list_groups(&self) -> Result<Vec<Group>> {
        self.http_client.get("/groups").await
    }

    /// Group detail including roster and balances
    pub async fn get_group(&self, group_id: &GroupId) -> Result<Group> {
        let path = format!("/groups/{}", segment(group_id.as_str()));
        self.http_client.get(&path).await
    }

    pub async fn create_group(&self, name: &str, default_points: i64) -> Result<Group> {
        let body = CreateGroupRequest {
            name: name.to_string(),
            default_points,
        };
        self.http_client.post("/groups", &body).await
    }

    pub async fn join_group(&self, invite_code: &str) -> Result<Group> {
        let body = JoinGroupRequest {
            invite_code: invite_code.to_string(),
        };
        self.http_client.post("/groups/join", &body).await
    }

    pub async fn update_group(
        &self,
        group_id: &GroupId,
        name: &str,
        default_points: i64,
    ) -> Result<()> {
        let path = format!("/groups/{}", segment(group_id.as_str()));
        let body = CreateGroupRequest {
            name: name.to_string(),
            default_points,
        };
        self.http_client.put_unit(&path, &body).await
    }

    /// Grant (or with a negative amount, deduct) points; admin only
    pub async fn grant_points(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
        amount: i64,
        note: &str,
    ) -> Result<()> {
        let path = format!("/groups/{}/grant", segment(group_id.as_str()));
        let body = GrantPointsRequest {
            user_id: user_id.clone(),
            amount,
            note: note.to_string(),
        };
        self.http_client.post_unit(&path, &body).await
    }

    pub async fn kick_member(&self, group_id: &GroupId, user_id: &UserId) -> Result<()> {
        let path = format!(
            "/groups/{}/members/{}",
            segment(group_id.as_str()),
            segment(user_id.as_str())
        );
        self.http_client.delete(&path).await
    }

    /// Rotate the invite code; returns the new code
    pub async fn regenerate_invite(&self, group_id: &GroupId) -> Result<String> {
        let path = format!("/groups/{}/regenerate-invite", segment(group_id.as_str()));
        let response: InviteCodeResponse = self.http_client.post(&path, &serde_json::json!({})).await?;
        Ok(response.invite_code)
    }

    /// Delete a group with all its pools; admin only
    pub async fn delete_group(&self, group_id: &GroupId) -> Result<()> {
        let path = format!("/groups/{}", segment(group_id.as_str()));
        self.http_client.delete(&path).await
    }

    // Standings

    /// Members ranked by balance
    pub async fn leaderboard(&self, group_id: &GroupId) -> Result<Vec<LeaderboardEntry>> {
        let path = format!("/groups/{}/leaderboard", segment(group_id.as_str()));
        self.http_client.get(&path).await
    }

    /// Points ledger of a group, newest first
    pub async fn history(&self, group_id: &GroupId, query: HistoryQuery) -> Result<HistoryPage> {
        let path = format!("/groups/{}/history", segment(group_id.as_str()));
        self.http_client.get_with_query(&path, &query).await
    }

    pub async fn stats(&self, group_id: &GroupId) -> Result<GroupStats> {
        let path = format!("/groups/{}/stats", segment(group_id.as_str()));
        self.http_client.get(&path).await
    }

    // Pools

    /// Pools of a group, optionally filtered by status
    pub async fn list_pools(
        &self,
        group_id: &GroupId,
        status: Option<PoolStatus>,
    ) -> Result<Vec<Pool>> {
        let path = format!("/groups/{}/pools", segment(group_id.as_str()));
        match status {
            Some(status) => {
                let filter = StatusFilter {
                    status: status.as_str(),
                };
                self.http_client.get_with_query(&path, &filter).await
            }
            None => self.http_client.get(&path).await,
        }
    }

    pub async fn get_pool(&self, group_id: &GroupId, pool_id: &PoolId) -> Result<Pool> {
        let path = format!(
            "/groups/{}/pools/{}",
            segment(group_id.as_str()),
            segment(pool_id.as_str())
        );
        self.http_client.get(&path).await
    }

    pub async fn create_pool(
        &self,
        group_id: &GroupId,
        title: &str,
        description: &str,
        options: Vec<String>,
    ) -> Result<Pool> {
        let path = format!("/groups/{}/pools", segment(group_id.as_str()));
        let body = CreatePoolRequest {
            title: title.to_string(),
            description: description.to_string(),
            options,
        };
        self.http_client.post(&path, &body).await
    }

    pub async fn place_bet(
        &self,
        group_id: &GroupId,
        pool_id: &PoolId,
        option_id: &OptionId,
        points: i64,
    ) -> Result<Bet> {
        let path = format!(
            "/groups/{}/pools/{}/bet",
            segment(group_id.as_str()),
            segment(pool_id.as_str())
        );
        let body = PlaceBetRequest {
            option_id: option_id.clone(),
            points,
        };
        self.http_client.post(&path, &body).await
    }

    pub async fn lock_pool(&self, group_id: &GroupId, pool_id: &PoolId) -> Result<()> {
        self.pool_action(group_id, pool_id, "lock").await
    }

    pub async fn resolve_pool(
        &self,
        group_id: &GroupId,
        pool_id: &PoolId,
        winning_option_id: &OptionId,
    ) -> Result<()> {
        let path = format!(
            "/groups/{}/pools/{}/resolve",
            segment(group_id.as_str()),
            segment(pool_id.as_str())
        );
        let body = ResolvePoolRequest {
            winning_option_id: winning_option_id.clone(),
        };
        self.http_client.post_unit(&path, &body).await
    }

    pub async fn cancel_pool(&self, group_id: &GroupId, pool_id: &PoolId) -> Result<()> {
        self.pool_action(group_id, pool_id, "cancel").await
    }

    async fn pool_action(&self, group_id: &GroupId, pool_id: &PoolId, action: &str) -> Result<()> {
        let path = format!(
            "/groups/{}/pools/{}/{}",
            segment(group_id.as_str()),
            segment(pool_id.as_str()),
            action
        );
        self.http_client.post_empty(&path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pool_json(id: &str, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "group_id": "g1",
            "title": "Will it rain?",
            "description": "",
            "status": status,
            "created_by": "u1",
            "resolved_at": null,
            "created_at": "2024-05-01T12:00:00Z",
            "options": [],
            "winning_option_id": "",
            "total_pot": 0,
            "bet_count": 0
        })
    }

    async fn client_for(server: &MockServer) -> ApiClient {
        ApiClient::new(format!("{}/api", server.uri()), Arc::new(Jar::default())).unwrap()
    }

    #[tokio::test]
    async fn test_list_pools_with_status_filter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/groups/g1/pools"))
            .and(query_param("status", "open"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([pool_json("p1", "open")])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let pools = client
            .list_pools(&GroupId::new("g1"), Some(PoolStatus::Open))
            .await
            .unwrap();

        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].id, PoolId::new("p1"));
    }

    #[tokio::test]
    async fn test_get_pool() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/groups/g1/pools/p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pool_json("p2", "locked")))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let pool = client
            .get_pool(&GroupId::new("g1"), &PoolId::new("p2"))
            .await
            .unwrap();

        assert_eq!(pool.status, PoolStatus::Locked);
    }

    #[tokio::test]
    async fn test_place_bet_sends_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/groups/g1/pools/p1/bet"))
            .and(body_json(json!({"option_id": "o1", "points": 50})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "b1",
                "pool_id": "p1",
                "user_id": "u1",
                "option_id": "o1",
                "points_wagered": 50,
                "created_at": "2024-05-01T12:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let bet = client
            .place_bet(&GroupId::new("g1"), &PoolId::new("p1"), &OptionId::new("o1"), 50)
            .await
            .unwrap();

        assert_eq!(bet.points_wagered, 50);
    }

    #[tokio::test]
    async fn test_api_error_message_is_extracted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/groups/g1/pools/p1/lock"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(json!({"error": "only the creator or an admin can lock"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .lock_pool(&GroupId::new("g1"), &PoolId::new("p1"))
            .await
            .unwrap_err();

        match err {
            Error::Api { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "only the creator or an admin can lock");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ids_are_escaped_like_the_socket_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/groups/a%2Fb%3F/pools/p%231"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pool_json("p#1", "open")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let pool = client
            .get_pool(&GroupId::new("a/b?"), &PoolId::new("p#1"))
            .await
            .unwrap();

        assert_eq!(pool.id, PoolId::new("p#1"));
    }

    #[test]
    fn test_segment_escapes_reserved_characters() {
        assert_eq!(segment("g1").to_string(), "g1");
        assert_eq!(segment("a/b?c#d%").to_string(), "a%2Fb%3Fc%23d%25");
    }

    #[tokio::test]
    async fn test_history_sends_paging() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/groups/g1/history"))
            .and(query_param("page", "3"))
            .and(query_param("limit", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [],
                "total": 41,
                "page": 3,
                "limit": 20
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let page = client
            .history(&GroupId::new("g1"), HistoryQuery { page: 3, limit: 20 })
            .await
            .unwrap();

        assert_eq!(page.total, 41);
        assert!(!page.has_more());
    }

    #[tokio::test]
    async fn test_unauthorized_on_session_check_does_not_require_login() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = client_for(&server).await;

        let anonymous = client.me().await.unwrap_err();
        assert!(matches!(anonymous, Error::Unauthorized { .. }));
        assert!(!anonymous.requires_login());

        let fetch = client.get_group(&GroupId::new("g1")).await.unwrap_err();
        assert!(fetch.requires_login());
    }

    #[tokio::test]
    async fn test_login_cookie_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "token=secret; Path=/; HttpOnly")
                    .set_body_json(json!({
                        "id": "u1",
                        "email": "ann@example.com",
                        "name": "Ann",
                        "avatar_url": ""
                    })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/auth/me"))
            .and(wiremock::matchers::header("cookie", "token=secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "u1",
                "email": "ann@example.com",
                "name": "Ann",
                "avatar_url": ""
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let user = client.login("ann@example.com", "hunter22").await.unwrap();
        assert_eq!(user.name, "Ann");

        let me = client.me().await.unwrap();
        assert_eq!(me.id, UserId::new("u1"));
    }
}
