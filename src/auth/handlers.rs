use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{error, instrument};
use url::Url;

use crate::{
    auth::{
        dto::{
            AuthResponse, CallbackQuery, LoginRequest, MessageResponse, PublicUser, RedirectQuery,
            RefreshResponse, RegisterRequest, SocialLoginRequest, TokenEnvelope, UserResponse,
        },
        extractors::ClientIp,
        services::{AuthContext, AuthSession},
    },
    error::AppError,
    state::AppState,
};

const SOCIAL_SUCCESS_PATH: &str = "/auth/social-callback";
const SOCIAL_ERROR_PATH: &str = "/login";
const SOCIAL_ERROR_CODE: &str = "social_login_failed";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/refresh", post(refresh))
        .route("/auth/user", get(current_user))
        .route("/auth/social-login", post(social_login))
        .route("/auth/social-login-redirect", get(social_login_redirect))
        .route("/auth/social-login-callback/:provider", get(social_login_callback))
}

impl From<AuthSession> for AuthResponse {
    fn from(session: AuthSession) -> Self {
        Self {
            user: PublicUser::from(&session.user),
            token: TokenEnvelope::from(&session.token),
        }
    }
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let Json(payload) = payload?;
    let session = state.auth.register(payload).await?;
    Ok((StatusCode::CREATED, Json(session.into())))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ip: ClientIp,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let Json(payload) = payload?;
    let session = state.auth.login(payload, ip.as_deref()).await?;
    Ok(Json(session.into()))
}

#[instrument(skip(state, ctx))]
pub async fn logout(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<Json<MessageResponse>, AppError> {
    state.auth.logout(&ctx).await?;
    Ok(Json(MessageResponse {
        message: "Successfully logged out.",
    }))
}

#[instrument(skip(state, ctx))]
pub async fn refresh(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<Json<RefreshResponse>, AppError> {
    let issued = state.auth.refresh(&ctx).await?;
    Ok(Json(RefreshResponse {
        message: "Token refreshed successfully.",
        token: TokenEnvelope::from(&issued),
    }))
}

pub async fn current_user(ctx: AuthContext) -> Json<UserResponse> {
    Json(UserResponse {
        user: PublicUser::from(&ctx.user),
    })
}

#[instrument(skip(state, payload))]
pub async fn social_login(
    State(state): State<AppState>,
    ip: ClientIp,
    payload: Result<Json<SocialLoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let Json(payload) = payload?;
    let session = state.auth.social_login(payload, ip.as_deref()).await?;
    Ok(Json(session.into()))
}

#[instrument(skip(state))]
pub async fn social_login_redirect(
    State(state): State<AppState>,
    Query(q): Query<RedirectQuery>,
) -> Result<Redirect, AppError> {
    let url = state.auth.social_redirect_url(q.provider.as_deref())?;
    Ok(Redirect::to(&url))
}

/// Browser leg of the OAuth flow. Failures never surface as error statuses:
/// the browser is always sent back to the front end.
#[instrument(skip(state, query))]
pub async fn social_login_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    ip: ClientIp,
    query: Option<Query<CallbackQuery>>,
) -> Response {
    let Some(provider) = state.auth.providers().resolve(&provider) else {
        return AppError::BadRequest("Invalid provider.".into()).into_response();
    };
    let frontend = &state.config.social.frontend_url;

    let code = query.and_then(|Query(q)| q.code).filter(|c| !c.is_empty());
    let Some(code) = code else {
        error!(%provider, "social callback without authorization code");
        return Redirect::to(&social_error_url(frontend)).into_response();
    };

    match state
        .auth
        .social_login_with_code(provider, &code, ip.as_deref())
        .await
    {
        Ok(session) => {
            let envelope = TokenEnvelope::from(&session.token);
            Redirect::to(&frontend_url(frontend, SOCIAL_SUCCESS_PATH, &envelope.query_pairs()))
                .into_response()
        }
        Err(e) => {
            error!(%provider, error = ?e, "social callback failed");
            Redirect::to(&social_error_url(frontend)).into_response()
        }
    }
}

fn social_error_url(base: &Url) -> String {
    frontend_url(
        base,
        SOCIAL_ERROR_PATH,
        &[("error", SOCIAL_ERROR_CODE.to_string())],
    )
}

/// `base` + `path` with the given query, keeping any path prefix of `base`.
fn frontend_url(base: &Url, path: &str, query: &[(&str, String)]) -> String {
    let mut url = base.clone();
    let joined = format!("{}{}", base.path().trim_end_matches('/'), path);
    url.set_path(&joined);
    url.query_pairs_mut()
        .clear()
        .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
    url.to_string()
}
