use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use chat_core::{ChatError, ChatErrorCategory, ChatMessage, ChatUser, classify_http_status};
use reqwest::{RequestBuilder, Response, header::RETRY_AFTER};
use serde::{Serialize, de::DeserializeOwned};
use tracing::trace;

use crate::{MessageService, UserService};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const LOGIN_PATH: &str = "/api/users/login";
const USERS_PATH: &str = "/api/users";
const CHAT_PATH: &str = "/api/chat";

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    name: &'a str,
    password: &'a str,
}

#[derive(Debug, Clone)]
struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    fn new(base_url: &str) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|err| {
                ChatError::new(
                    ChatErrorCategory::Config,
                    "client_build_error",
                    err.to_string(),
                )
            })?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: Arc::new(RwLock::new(None)),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn set_token(&self, token: Option<String>) {
        if let Ok(mut current) = self.token.write() {
            *current = token;
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self.token.read().ok().and_then(|token| token.clone());
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, ChatError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        trace!(status = status.as_u16(), url = %response.url(), "chat api response");

        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();

        let mut err = ChatError::new(
            classify_http_status(status.as_u16()),
            "chat_http_error",
            format!("HTTP {}: {}", status.as_u16(), body.trim()),
        );
        if let Some(seconds) = retry_after {
            err = err.with_retry_after(Duration::from_secs(seconds));
        }
        Err(err)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ChatError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .execute(self.http.post(self.url(path)).json(body))
            .await?;
        response.json::<T>().await.map_err(map_transport_error)
    }
}

/// [`UserService`] backed by the chat REST API.
#[derive(Debug, Clone)]
pub struct HttpUserService {
    api: ApiClient,
}

impl HttpUserService {
    pub fn new(base_url: &str) -> Result<Self, ChatError> {
        Ok(Self {
            api: ApiClient::new(base_url)?,
        })
    }
}

#[async_trait]
impl UserService for HttpUserService {
    async fn login(&self, username: &str, password: &str) -> Result<ChatUser, ChatError> {
        self.api
            .post_json(
                LOGIN_PATH,
                &Credentials {
                    name: username,
                    password,
                },
            )
            .await
    }

    async fn create_user(&self, username: &str, password: &str) -> Result<ChatUser, ChatError> {
        self.api
            .post_json(
                USERS_PATH,
                &Credentials {
                    name: username,
                    password,
                },
            )
            .await
    }
}

/// [`MessageService`] backed by the chat REST API.
///
/// Once an identity carrying a token is bound, every call sends it as a
/// bearer token.
#[derive(Debug, Clone)]
pub struct HttpMessageService {
    api: ApiClient,
}

impl HttpMessageService {
    pub fn new(base_url: &str) -> Result<Self, ChatError> {
        Ok(Self {
            api: ApiClient::new(base_url)?,
        })
    }
}

#[async_trait]
impl MessageService for HttpMessageService {
    async fn send_message(&self, message: &ChatMessage) -> Result<bool, ChatError> {
        self.api
            .execute(self.api.http.post(self.api.url(CHAT_PATH)).json(message))
            .await
            .map(|_| true)
    }

    async fn fetch_messages(&self) -> Result<Vec<ChatMessage>, ChatError> {
        let response = self
            .api
            .execute(self.api.http.get(self.api.url(CHAT_PATH)))
            .await?;
        response
            .json::<Vec<ChatMessage>>()
            .await
            .map_err(map_transport_error)
    }

    fn set_identity(&self, user: Option<&ChatUser>) {
        self.api.set_token(user.and_then(|user| user.token.clone()));
    }
}

fn map_transport_error(err: reqwest::Error) -> ChatError {
    if err.is_decode() {
        return ChatError::new(
            ChatErrorCategory::Serialization,
            "chat_decode_error",
            err.to_string(),
        );
    }
    if let Some(status) = err.status() {
        return ChatError::new(
            classify_http_status(status.as_u16()),
            "chat_http_error",
            err.to_string(),
        );
    }
    ChatError::new(
        ChatErrorCategory::Network,
        "chat_transport_error",
        err.to_string(),
    )
}
