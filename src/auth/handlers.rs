use actix_web::{HttpRequest, HttpResponse, web};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::users::{insert_account, new_account},
    auth::{
        auth::{AuthUser, bearer_token},
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    errors::{AppError, AppResult},
    model::{
        account::{Account, Credentials, account_key},
        role::Role,
    },
    models::{LoginReqDto, LoginResponse, RefreshTokenRecord, RegisterReq, TokenType},
    store::{
        Collection, Document, Guard, InsertOutcome, RecordStore, UpdateOutcome, from_document,
        to_document,
    },
    utils::{email_cache::EmailCache, email_filter::EmailFilter, patch::looks_like_email},
};

const MIN_PASSWORD_LEN: usize = 8;

/// true  => email can still be registered
/// false => a password-holding account already uses it
pub async fn is_email_available(
    email: &str,
    filter: &EmailFilter,
    cache: &EmailCache,
    store: &dyn RecordStore,
) -> AppResult<bool> {
    // 1. Cuckoo filter: fast negative
    if !filter.might_exist(email) {
        return Ok(true);
    }

    // 2. Moka cache: fast positive
    if cache.is_taken(email).await {
        return Ok(false);
    }

    // 3. Store fallback
    let Some(doc) = store.find_by_key(Collection::Users, &account_key(email)).await? else {
        return Ok(true);
    };
    let credentials: Credentials = from_document(doc)?;
    if credentials.password_hash.is_some() {
        cache.mark_taken(email).await;
        return Ok(false);
    }

    // passwordless accounts can be claimed
    Ok(true)
}

#[derive(Deserialize, IntoParams)]
pub struct EmailQuery {
    /// Email to check
    pub email: String,
}

#[derive(Serialize, ToSchema)]
pub struct EmailAvailability {
    pub email: String,
    pub available: bool,
}

#[utoipa::path(
    get,
    path = "/api/auth/email-available",
    params(EmailQuery),
    responses(
        (status = 200, description = "Whether the email can be registered", body = EmailAvailability),
        (status = 400, description = "Not an email address")
    ),
    tag = "Auth"
)]
pub async fn email_available(
    query: web::Query<EmailQuery>,
    store: web::Data<dyn RecordStore>,
    filter: web::Data<EmailFilter>,
    cache: web::Data<EmailCache>,
) -> AppResult<HttpResponse> {
    let email = account_key(&query.email);
    if !looks_like_email(&email) {
        return Err(AppError::validation("A valid email is required"));
    }

    let available = is_email_available(&email, &filter, &cache, store.get_ref()).await?;
    Ok(HttpResponse::Ok().json(EmailAvailability { email, available }))
}

/// Creates an account, or claims a passwordless one (added earlier by a
/// vendor) with the same email.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterReq,
    responses(
        (status = 201, description = "Account registered", body = Account),
        (status = 400, description = "Missing or invalid fields"),
        (status = 403, description = "Admin accounts cannot self-register"),
        (status = 409, description = "Email already registered")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_register", skip_all, fields(email = %payload.email))]
pub async fn register(
    payload: web::Json<RegisterReq>,
    store: web::Data<dyn RecordStore>,
    filter: web::Data<EmailFilter>,
    cache: web::Data<EmailCache>,
) -> AppResult<HttpResponse> {
    let email = account_key(&payload.email);
    let name = payload.name.trim();

    if email.is_empty() || payload.password.is_empty() || name.is_empty() {
        return Err(AppError::validation("Email, password and name are required"));
    }
    if !looks_like_email(&email) {
        return Err(AppError::validation("A valid email is required"));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::validation("Password must be at least 8 characters"));
    }
    if payload.user_type == Role::Admin {
        return Err(AppError::forbidden("Admin accounts cannot self-register"));
    }

    if !is_email_available(&email, &filter, &cache, store.get_ref()).await? {
        return Err(AppError::conflict("Email already registered"));
    }

    let password_hash = hash_password(&payload.password)?;

    let mut account = new_account(&email, name, payload.user_type);
    account.company = payload.company.clone();
    account.phone = payload.phone.clone();

    let stored = match insert_account(store.get_ref(), &filter, &account, Some(&password_hash))
        .await?
    {
        InsertOutcome::Inserted(doc) => {
            info!("Account registered");
            doc
        }
        InsertOutcome::Exists(existing) => {
            let id = existing
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            claim_account(store.get_ref(), &id, &password_hash, &payload).await?
        }
    };

    cache.mark_taken(&email).await;
    let account: Account = from_document(stored)?;
    Ok(HttpResponse::Created().json(account))
}

async fn claim_account(
    store: &dyn RecordStore,
    id: &str,
    password_hash: &str,
    payload: &RegisterReq,
) -> AppResult<Document> {
    let mut patch = Document::new();
    patch.insert("passwordHash".into(), json!(password_hash));
    patch.insert("name".into(), json!(payload.name.trim()));
    if let Some(phone) = &payload.phone {
        patch.insert("phone".into(), json!(phone));
    }
    if let Some(company) = &payload.company {
        patch.insert("company".into(), json!(company));
    }
    patch.insert("updatedAt".into(), json!(Utc::now()));

    // the account type picked by whoever created it stays
    match store
        .update(Collection::Users, id, Some(&Guard::missing("passwordHash")), patch)
        .await?
    {
        UpdateOutcome::Updated(doc) => {
            info!(account_id = id, "Passwordless account claimed");
            Ok(doc)
        }
        UpdateOutcome::GuardFailed | UpdateOutcome::NotFound => {
            Err(AppError::conflict("Email already registered"))
        }
    }
}

async fn issue_tokens(
    user: &AuthUser,
    store: &dyn RecordStore,
    config: &Config,
) -> AppResult<(String, String)> {
    let access_token =
        generate_access_token(user, &config.jwt_secret, config.access_token_ttl)?;
    let (refresh_token, refresh_claims) =
        generate_refresh_token(user, &config.jwt_secret, config.refresh_token_ttl)?;

    debug!(jti = %refresh_claims.jti, "Storing refresh token");
    let record = RefreshTokenRecord {
        id: refresh_claims.jti,
        user_id: user.user_id.clone(),
        expires_at: refresh_claims.exp as i64,
        revoked: false,
    };
    store
        .insert(Collection::RefreshTokens, to_document(&record)?)
        .await?;

    Ok((access_token, refresh_token))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Access and refresh tokens", body = LoginResponse),
        (status = 400, description = "Email or password missing"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_login", skip_all, fields(email = %payload.email))]
pub async fn login(
    payload: web::Json<LoginReqDto>,
    store: web::Data<dyn RecordStore>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    info!("Login request received");

    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::validation("Email and password are required"));
    }

    let Some(doc) = store
        .find_by_key(Collection::Users, &account_key(&payload.email))
        .await?
    else {
        info!("Invalid credentials: account not found");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    };

    let credentials: Credentials = from_document(doc.clone())?;
    let Some(hashed) = credentials.password_hash.as_deref() else {
        info!("Invalid credentials: account not claimed yet");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    };

    if let Err(e) = verify_password(&payload.password, hashed) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    let user = AuthUser {
        user_id: credentials.id.clone(),
        email: credentials.email.clone(),
        name: credentials.name.clone(),
        role: credentials.user_type,
    };
    let (access_token, refresh_token) = issue_tokens(&user, store.get_ref(), &config).await?;

    // non-fatal
    let mut patch = Document::new();
    patch.insert("lastLoginAt".into(), json!(Utc::now()));
    if let Err(e) = store
        .update(Collection::Users, &credentials.id, None, patch)
        .await
    {
        error!(error = %e, "Failed to update lastLoginAt");
    }

    info!("Login successful");

    Ok(HttpResponse::Ok().json(LoginResponse {
        access_token,
        refresh_token,
        user: from_document(doc)?,
    }))
}

/// Rotates a refresh token: the presented one is revoked and a new pair is
/// issued. A revoked or reused token is rejected.
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = LoginResponse),
        (status = 401, description = "Missing, invalid or revoked refresh token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    store: web::Data<dyn RecordStore>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let unauthorized = || AppError::Unauthorized("Invalid refresh token".into());

    let token = bearer_token(&req).ok_or_else(unauthorized)?;
    let claims = verify_token(token, &config.jwt_secret).map_err(|_| unauthorized())?;
    if claims.token_type != TokenType::Refresh {
        return Err(unauthorized());
    }

    let record: RefreshTokenRecord = match store.get(Collection::RefreshTokens, &claims.jti).await? {
        Some(doc) => from_document(doc)?,
        None => return Err(unauthorized()),
    };
    if record.revoked {
        warn!(user_id = %record.user_id, "Revoked refresh token presented");
        return Err(unauthorized());
    }

    // revoke old refresh token; a concurrent refresh loses here
    let mut patch = Document::new();
    patch.insert("revoked".into(), json!(true));
    let revoked = store
        .update(
            Collection::RefreshTokens,
            &record.id,
            Some(&Guard::equals("revoked", false)),
            patch,
        )
        .await?;
    if !matches!(revoked, UpdateOutcome::Updated(_)) {
        return Err(unauthorized());
    }

    // re-read the account so renamed or retyped users get fresh claims
    let doc = store
        .get(Collection::Users, &record.user_id)
        .await?
        .ok_or_else(unauthorized)?;
    let credentials: Credentials = from_document(doc.clone())?;
    let user = AuthUser {
        user_id: credentials.id,
        email: credentials.email,
        name: credentials.name,
        role: credentials.user_type,
    };

    let (access_token, refresh_token) = issue_tokens(&user, store.get_ref(), &config).await?;

    Ok(HttpResponse::Ok().json(LoginResponse {
        access_token,
        refresh_token,
        user: from_document(doc)?,
    }))
}

/// Revokes the presented refresh token. Always 204.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses((status = 204, description = "Logged out")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    store: web::Data<dyn RecordStore>,
    config: web::Data<Config>,
) -> HttpResponse {
    let Some(token) = bearer_token(&req) else {
        return HttpResponse::NoContent().finish();
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) if c.token_type == TokenType::Refresh => c,
        _ => return HttpResponse::NoContent().finish(),
    };

    // idempotent
    let mut patch = Document::new();
    patch.insert("revoked".into(), json!(true));
    if let Err(e) = store
        .update(Collection::RefreshTokens, &claims.jti, None, patch)
        .await
    {
        error!(error = %e, "Failed to revoke refresh token");
    }

    HttpResponse::NoContent().finish()
}

#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "The signed-in account", body = Account),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Account was deleted")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn me(auth: AuthUser, store: web::Data<dyn RecordStore>) -> AppResult<HttpResponse> {
    let doc = store
        .get(Collection::Users, &auth.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Account not found"))?;
    let account: Account = from_document(doc)?;
    Ok(HttpResponse::Ok().json(account))
}

#[cfg(test)]
mod tests {
    use actix_web::http::{Method, StatusCode, header};
    use actix_web::test;
    use serde_json::{Value, json};

    use crate::api::test_support::{authed, request, seed_account, test_state};
    use crate::api::users::{insert_account, new_account};
    use crate::build_app;
    use crate::model::role::Role;
    use crate::utils::email_filter::EmailFilter;

    macro_rules! call_json {
        ($app:expr, $req:expr) => {{
            let resp = test::call_service(&$app, $req.to_request()).await;
            let status = resp.status();
            let body: Value = test::read_body_json(resp).await;
            (status, body)
        }};
    }

    fn registration(email: &str, user_type: &str) -> Value {
        json!({
            "email": email,
            "password": "correct horse battery",
            "name": "Jane Smith",
            "userType": user_type
        })
    }

    #[actix_web::test]
    async fn register_login_refresh_rotation() {
        let app = test::init_service(build_app(test_state())).await;

        let (status, account) = call_json!(
            app,
            request(Method::POST, "/api/auth/register").set_json(registration("Jane@Acme.co.uk", "Client"))
        );
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(account["email"], "jane@acme.co.uk");
        assert!(account.get("passwordHash").is_none());

        let (status, _) = call_json!(
            app,
            request(Method::POST, "/api/auth/register").set_json(registration("jane@acme.co.uk", "Client"))
        );
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call_json!(
            app,
            request(Method::POST, "/api/auth/login")
                .set_json(json!({ "email": "jane@acme.co.uk", "password": "wrong password" }))
        );
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, tokens) = call_json!(
            app,
            request(Method::POST, "/api/auth/login")
                .set_json(json!({ "email": "jane@acme.co.uk", "password": "correct horse battery" }))
        );
        assert_eq!(status, StatusCode::OK);
        let access = tokens["accessToken"].as_str().unwrap().to_string();
        let refresh = tokens["refreshToken"].as_str().unwrap().to_string();

        let (status, me) = call_json!(app, authed(Method::GET, "/api/me", &access));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["userType"], "Client");

        // refresh tokens are not identities
        let resp = test::call_service(&app, authed(Method::GET, "/api/me", &refresh).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let (status, rotated) = call_json!(app, authed(Method::POST, "/api/auth/refresh", &refresh));
        assert_eq!(status, StatusCode::OK);
        assert_ne!(rotated["refreshToken"], tokens["refreshToken"]);

        // the old refresh token was revoked by the rotation
        let (status, _) = call_json!(app, authed(Method::POST, "/api/auth/refresh", &refresh));
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let new_refresh = rotated["refreshToken"].as_str().unwrap();
        let resp = test::call_service(
            &app,
            request(Method::POST, "/api/auth/logout")
                .insert_header((header::AUTHORIZATION, format!("Bearer {new_refresh}")))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let (status, _) = call_json!(app, authed(Method::POST, "/api/auth/refresh", new_refresh));
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn passwordless_accounts_can_be_claimed() {
        let state = test_state();
        seed_account(&state, "sam@northcare.co.uk", Role::Client).await;
        let app = test::init_service(build_app(state)).await;

        let (_, availability) = call_json!(
            app,
            request(Method::GET, "/api/auth/email-available?email=sam@northcare.co.uk")
        );
        assert_eq!(availability["available"], true);

        // the type chosen by whoever added the account stays
        let (status, account) = call_json!(
            app,
            request(Method::POST, "/api/auth/register").set_json(registration("sam@northcare.co.uk", "Vendor"))
        );
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(account["userType"], "Client");
        assert_eq!(account["name"], "Jane Smith");

        let (_, availability) = call_json!(
            app,
            request(Method::GET, "/api/auth/email-available?email=sam@northcare.co.uk")
        );
        assert_eq!(availability["available"], false);
    }

    #[actix_web::test]
    async fn admins_cannot_self_register() {
        let app = test::init_service(build_app(test_state())).await;
        let (status, body) = call_json!(
            app,
            request(Method::POST, "/api/auth/register").set_json(registration("root@agency.test", "Admin"))
        );
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Admin accounts cannot self-register");
    }

    #[actix_web::test]
    async fn existing_email_is_taken_before_the_filter_warms_up() {
        let state = test_state();
        // stored before this process started, so the filter never saw it
        let account = new_account("old@agency.test", "Old Hand", Role::Vendor);
        insert_account(state.store.as_ref(), &EmailFilter::new(), &account, Some("hash"))
            .await
            .unwrap();
        let app = test::init_service(build_app(state)).await;

        let (status, body) = call_json!(
            app,
            request(Method::GET, "/api/auth/email-available?email=old@agency.test")
        );
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["available"], false);

        let (_, body) = call_json!(
            app,
            request(Method::GET, "/api/auth/email-available?email=new@agency.test")
        );
        assert_eq!(body["available"], true);
    }

    #[actix_web::test]
    async fn logout_without_a_token_still_succeeds() {
        let app = test::init_service(build_app(test_state())).await;
        let resp = test::call_service(&app, request(Method::POST, "/api/auth/logout").to_request()).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }
}
