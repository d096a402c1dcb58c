use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, DefaultBodyLimit, FromRef, FromRequestParts, Path, State},
    http::{header, request::Parts, HeaderName, HeaderValue, Method, StatusCode},
    middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use rentease_shared::constants::{
    DEFAULT_AVATAR, HARD_MESSAGE_LIMIT, UNKNOWN_USER_NAME, USER_ID_HEADER,
};
use rentease_shared::types::{MessageId, UserId};
use rentease_store::{ContentPolicy, ConversationSummary, Message, NewMessage, User};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::gateway::{socket::ws_handler, Gateway};
use crate::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::store::MessageStore;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Gateway,
    pub store: MessageStore,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
}

impl FromRef<AppState> for Gateway {
    fn from_ref(state: &AppState) -> Self {
        state.gateway.clone()
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/socket", get(ws_handler))
        .route(
            "/api/messages/conversations/:user_id",
            get(list_conversations),
        )
        .route("/api/messages/read/:user_id", put(mark_conversation_read))
        .route("/api/messages/:id/:other_id", get(chat_history))
        .route("/api/messages/:id", delete(delete_message))
        .route("/api/messages", post(create_message))
        .route("/api/users/me", put(update_profile))
        .route("/api/users/:id", get(get_user))
        .layer(DefaultBodyLimit::max(HARD_MESSAGE_LIMIT))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(USER_ID_HEADER),
        ])
        .allow_credentials(true)
}

/// Caller identity, established upstream and forwarded in `X-User-Id`.
pub struct Caller(pub UserId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Caller(UserId::new(v)))
            .ok_or(ServerError::Unauthorized)
    }
}

// ─── Responses ───

#[derive(Serialize)]
struct HealthResponse {
    success: bool,
    message: &'static str,
    timestamp: DateTime<Utc>,
    version: &'static str,
    online: usize,
    connections: usize,
}

/// Display fields of a message participant, resolved from the user directory.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Participant {
    #[serde(rename = "_id")]
    id: UserId,
    full_name: String,
    avatar: String,
}

impl Participant {
    fn resolve(id: UserId, user: Option<User>) -> Self {
        match user {
            Some(user) => Self {
                id,
                full_name: user.full_name,
                avatar: user.avatar.unwrap_or_else(|| DEFAULT_AVATAR.to_string()),
            },
            None => Self {
                id,
                full_name: UNKNOWN_USER_NAME.to_string(),
                avatar: DEFAULT_AVATAR.to_string(),
            },
        }
    }
}

/// A message with both participants' profiles attached.
#[derive(Serialize)]
struct MessageView {
    #[serde(flatten)]
    message: Message,
    sender: Participant,
    receiver: Participant,
}

#[derive(Serialize)]
struct HistoryResponse {
    success: bool,
    count: usize,
    messages: Vec<MessageView>,
}

#[derive(Serialize)]
struct MessageResponse {
    success: bool,
    message: MessageView,
}

#[derive(Serialize)]
struct ConversationsResponse {
    success: bool,
    conversations: Vec<ConversationSummary>,
}

#[derive(Serialize)]
struct StatusResponse {
    success: bool,
    message: String,
}

#[derive(Serialize)]
struct UserResponse {
    success: bool,
    user: User,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileRequest {
    full_name: String,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

// ─── Handlers ───

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        message: "RentEase messaging server is running",
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
        online: state.gateway.presence().online_users().await.len(),
        connections: state.gateway.hub().connection_count().await,
    })
}

async fn chat_history(
    _caller: Caller,
    State(state): State<AppState>,
    Path((a, b)): Path<(String, String)>,
) -> Result<Json<HistoryResponse>, ServerError> {
    let messages = state.store.history(UserId(a), UserId(b)).await?;
    let messages = with_participants(&state.store, messages).await?;
    Ok(Json(HistoryResponse {
        success: true,
        count: messages.len(),
        messages,
    }))
}

async fn create_message(
    Caller(caller): Caller,
    State(state): State<AppState>,
    payload: Result<Json<NewMessage>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), ServerError> {
    let Json(mut new) = payload?;
    if new.sender_id.is_blank() {
        new.sender_id = caller;
    }

    let size = serde_json::to_vec(&new)
        .map(|v| v.len())
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    if size > state.config.max_message_bytes {
        return Err(ServerError::PayloadTooLarge {
            size,
            max: state.config.max_message_bytes,
        });
    }

    let message = state.store.persist(new, ContentPolicy::Require).await?;
    info!(id = %message.id, from = %message.sender_id, to = %message.receiver_id, "Message saved via API");

    let message = with_participants(&state.store, vec![message])
        .await?
        .pop()
        .ok_or_else(|| ServerError::Internal("saved message vanished".into()))?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            success: true,
            message,
        }),
    ))
}

async fn mark_conversation_read(
    Caller(caller): Caller,
    State(state): State<AppState>,
    Path(sender): Path<String>,
) -> Result<Json<StatusResponse>, ServerError> {
    let updated = state.store.mark_read(UserId(sender), caller).await?;
    Ok(Json(StatusResponse {
        success: true,
        message: format!("{updated} messages marked as read"),
    }))
}

async fn delete_message(
    Caller(caller): Caller,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ServerError> {
    // An unparsable id cannot name a stored message.
    let id = MessageId::parse(&id).map_err(|_| ServerError::NotFound("Message".into()))?;

    if state.config.delete_requires_participant {
        let message = state.store.get_message(id).await?;
        if message.sender_id != caller && message.receiver_id != caller {
            return Err(ServerError::Forbidden(
                "only the sender or receiver may delete a message".into(),
            ));
        }
    }

    state.store.delete(id).await?;
    info!(id = %id, by = %caller, "Message deleted");

    Ok(Json(StatusResponse {
        success: true,
        message: "Message deleted".into(),
    }))
}

async fn list_conversations(
    _caller: Caller,
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<ConversationsResponse>, ServerError> {
    let conversations = state.store.list_conversations(UserId(user)).await?;
    Ok(Json(ConversationsResponse {
        success: true,
        conversations,
    }))
}

async fn update_profile(
    Caller(caller): Caller,
    State(state): State<AppState>,
    payload: Result<Json<ProfileRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, ServerError> {
    let Json(req) = payload?;
    let full_name = req.full_name.trim().to_string();
    if full_name.is_empty() {
        return Err(ServerError::Validation("fullName is required".into()));
    }
    let user = state
        .store
        .upsert_user(caller, full_name, req.avatar, req.email)
        .await?;
    Ok(Json(UserResponse {
        success: true,
        user,
    }))
}

async fn get_user(
    _caller: Caller,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ServerError> {
    let user = state
        .store
        .find_user(UserId(id))
        .await?
        .ok_or_else(|| ServerError::NotFound("User".into()))?;
    Ok(Json(UserResponse {
        success: true,
        user,
    }))
}

/// Attach sender and receiver profiles, looking each identity up once.
async fn with_participants(
    store: &MessageStore,
    messages: Vec<Message>,
) -> Result<Vec<MessageView>, ServerError> {
    let mut profiles: HashMap<UserId, Participant> = HashMap::new();
    let mut views = Vec::with_capacity(messages.len());

    for message in messages {
        for id in [&message.sender_id, &message.receiver_id] {
            if !profiles.contains_key(id) {
                let user = store.find_user(id.clone()).await?;
                profiles.insert(id.clone(), Participant::resolve(id.clone(), user));
            }
        }
        let profile = |id: &UserId| {
            profiles
                .get(id)
                .cloned()
                .unwrap_or_else(|| Participant::resolve(id.clone(), None))
        };
        let sender = profile(&message.sender_id);
        let receiver = profile(&message.receiver_id);
        views.push(MessageView {
            message,
            sender,
            receiver,
        });
    }

    Ok(views)
}

/// Serve the API and socket until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    addr: std::net::SocketAddr,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}
