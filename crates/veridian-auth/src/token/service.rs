//! Token endpoint orchestration.
//!
//! One handler per grant type behind a common entry point, so each
//! grant's invariants stay independently testable:
//!
//! - `authorization_code`: consume the code (atomic single-use),
//!   verify the client/redirect binding and PKCE, check the tenant,
//!   mint tokens, open a refresh family
//! - `refresh_token`: delegate to the ledger, re-fetch subject context
//!   from the data layer, mint a fresh access token
//! - `password`: gate through the login security tracker before and
//!   after credential comparison (trusted first-party clients only)
//!
//! Side effects per request: at most one code consumed, at most one
//! refresh family or rotation record written, one audit event per
//! terminal outcome.

use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordVerifier},
};
use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::AuthResult;
use crate::audit::{AuditEvent, AuditKind};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::keys::KeyManager;
use crate::ledger::RefreshTokenLedger;
use crate::lockout::{LoginGate, LoginSecurityTracker};
use crate::oauth::code::AuthorizationCode;
use crate::oauth::pkce::{PkceChallenge, PkceVerifier};
use crate::oauth::request::{TokenRequest, TokenResponse};
use crate::storage::{CodeStorage, UserStorage};
use crate::token::jwt::{AccessTokenClaims, IdTokenClaims};
use crate::types::{Client, GrantType, Subject};

/// Verifies CAPTCHA tokens against the configured provider.
///
/// The provider round-trip is an external collaborator; the engine
/// only needs a yes/no answer.
#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    /// Returns `true` if the CAPTCHA token is valid.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unreachable; the caller
    /// fails the gate closed.
    async fn verify(&self, token: &str) -> AuthResult<bool>;
}

/// Token service: dispatches grants and mints tokens.
pub struct TokenService {
    key_manager: Arc<KeyManager>,
    code_storage: Arc<dyn CodeStorage>,
    ledger: Arc<RefreshTokenLedger>,
    user_storage: Arc<dyn UserStorage>,
    tracker: Arc<LoginSecurityTracker>,
    captcha: Option<Arc<dyn CaptchaVerifier>>,
    config: AuthConfig,
}

impl TokenService {
    /// Creates a new token service.
    #[must_use]
    pub fn new(
        key_manager: Arc<KeyManager>,
        code_storage: Arc<dyn CodeStorage>,
        ledger: Arc<RefreshTokenLedger>,
        user_storage: Arc<dyn UserStorage>,
        tracker: Arc<LoginSecurityTracker>,
        config: AuthConfig,
    ) -> Self {
        Self {
            key_manager,
            code_storage,
            ledger,
            user_storage,
            tracker,
            captcha: None,
            config,
        }
    }

    /// Configures a CAPTCHA verifier for the password grant.
    #[must_use]
    pub fn with_captcha_verifier(mut self, captcha: Arc<dyn CaptchaVerifier>) -> Self {
        self.captcha = Some(captcha);
        self
    }

    /// Dispatches a token request to its grant handler.
    ///
    /// # Errors
    ///
    /// Returns the grant handler's error, or `UnsupportedGrantType`
    /// for unknown grants.
    pub async fn handle(&self, request: &TokenRequest, client: &Client) -> AuthResult<TokenResponse> {
        let grant = GrantType::parse(&request.grant_type)
            .ok_or_else(|| AuthError::unsupported_grant_type(&request.grant_type))?;

        if !client.is_grant_type_allowed(grant) {
            return Err(AuthError::unsupported_grant_type(&request.grant_type));
        }

        match grant {
            GrantType::AuthorizationCode => self.exchange_code(request, client).await,
            GrantType::RefreshToken => self.refresh(request, client).await,
            GrantType::Password => self.password(request, client).await,
        }
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGrant` for missing/used/expired/mismatched
    /// codes and `PkceVerificationFailed` (also surfaced as
    /// `invalid_grant`) for verifier mismatches, without further
    /// detail.
    pub async fn exchange_code(
        &self,
        request: &TokenRequest,
        client: &Client,
    ) -> AuthResult<TokenResponse> {
        let code = request
            .code
            .as_ref()
            .ok_or_else(|| AuthError::invalid_request("Missing code parameter"))?;
        let redirect_uri = request
            .redirect_uri
            .as_ref()
            .ok_or_else(|| AuthError::invalid_request("Missing redirect_uri parameter"))?;
        let code_verifier = request
            .code_verifier
            .as_ref()
            .ok_or_else(|| AuthError::invalid_request("Missing code_verifier parameter"))?;

        // Single-use consumption is atomic with the used-flag check;
        // the loser of a double-spend race fails here.
        let code = self.code_storage.consume(code).await.map_err(|e| match e {
            AuthError::InvalidGrant { .. } => e,
            e if e.is_server_error() => e,
            _ => AuthError::invalid_grant("Invalid authorization code"),
        })?;

        if code.is_expired() {
            return self.reject_code(&code, client, "code_expired");
        }

        // Code-substitution defenses: the exchange must come from the
        // client and redirect URI the code was bound to.
        if code.client_id != client.client_id {
            return self.reject_code(&code, client, "client_mismatch");
        }
        if code.redirect_uri != *redirect_uri {
            return self.reject_code(&code, client, "redirect_uri_mismatch");
        }

        // PKCE: recompute the S256 hash of the presented verifier.
        let challenge = PkceChallenge::new(code.code_challenge.clone())
            .map_err(|_| AuthError::invalid_grant("Invalid authorization code"))?;
        let verifier = PkceVerifier::new(code_verifier.clone())
            .map_err(|_| AuthError::PkceVerificationFailed)?;
        if challenge.verify(&verifier).is_err() {
            AuditEvent::new(AuditKind::TokenRejected)
                .subject(Subject::User(code.subject_id))
                .client(&client.client_id)
                .detail("reason", "pkce_mismatch")
                .record();
            return Err(AuthError::PkceVerificationFailed);
        }

        // Tenant binding: the client must belong to the code's tenant.
        if client.organization_id != code.organization_id {
            return self.reject_code(&code, client, "tenant_mismatch");
        }

        let subject = Subject::User(code.subject_id);
        let access_token = self
            .mint_access_token(subject, code.organization_id, client, &code.scope, None)
            .await?;

        let mut response = TokenResponse::new(
            access_token,
            self.access_lifetime(client).whole_seconds() as u64,
            code.scope.clone(),
        );

        if has_scope(&code.scope, "openid") {
            let id_token = self.mint_id_token(&code, client).await?;
            response = response.with_id_token(id_token);
        }

        let (refresh_value, _) = self
            .ledger
            .issue_family(subject, code.organization_id, client, &code.scope)
            .await?;
        response = response.with_refresh_token(refresh_value);

        AuditEvent::new(AuditKind::TokenIssued)
            .subject(subject)
            .client(&client.client_id)
            .detail("grant", "authorization_code")
            .record();

        Ok(response)
    }

    /// Refreshes an access token.
    ///
    /// The ledger runs its reuse check before any token is minted. The
    /// subject's claims context is re-fetched from the data layer;
    /// claims embedded in the old access token are never trusted.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRefreshToken` for every token-state failure,
    /// indistinguishably.
    pub async fn refresh(&self, request: &TokenRequest, client: &Client) -> AuthResult<TokenResponse> {
        let presented = request
            .refresh_token
            .as_ref()
            .ok_or_else(|| AuthError::invalid_request("Missing refresh_token parameter"))?;

        let outcome = self.ledger.rotate(presented, client).await?;
        let token = &outcome.token;

        // Re-validate the subject against the data layer.
        if let Subject::User(user_id) = token.subject {
            let user = self
                .user_storage
                .find_by_id(user_id)
                .await?
                .ok_or_else(|| {
                    AuthError::invalid_refresh_token(crate::error::RefreshFailure::NotFound)
                })?;
            if !user.active {
                return Err(AuthError::invalid_refresh_token(
                    crate::error::RefreshFailure::NotFound,
                ));
            }
        }

        let access_token = self
            .mint_access_token(
                token.subject,
                token.organization_id,
                client,
                &token.scope,
                None,
            )
            .await?;

        let mut response = TokenResponse::new(
            access_token,
            self.access_lifetime(client).whole_seconds() as u64,
            token.scope.clone(),
        );
        if let Some(new_value) = outcome.new_value {
            response = response.with_refresh_token(new_value);
        }

        AuditEvent::new(AuditKind::TokenIssued)
            .subject(token.subject)
            .client(&client.client_id)
            .detail("grant", "refresh_token")
            .record();

        Ok(response)
    }

    /// Resource Owner Password Credentials grant.
    ///
    /// Restricted to trusted first-party clients. The login security
    /// tracker gates the attempt before credentials are compared and
    /// is updated after.
    ///
    /// # Errors
    ///
    /// Returns `AccountLocked`/`CaptchaRequired` from the gate,
    /// `InvalidGrant` for bad credentials, or storage errors (which
    /// fail the attempt closed).
    pub async fn password(&self, request: &TokenRequest, client: &Client) -> AuthResult<TokenResponse> {
        if !client.first_party {
            return Err(AuthError::unauthorized(
                "Password grant is restricted to first-party clients",
            ));
        }

        let username = request
            .username
            .as_ref()
            .ok_or_else(|| AuthError::invalid_request("Missing username parameter"))?;
        let password = request
            .password
            .as_ref()
            .ok_or_else(|| AuthError::invalid_request("Missing password parameter"))?;

        let user = self
            .user_storage
            .find_by_username(username)
            .await?
            .filter(|u| u.active)
            .ok_or_else(|| AuthError::invalid_grant("Invalid credentials"))?;

        // Gate before credential comparison.
        match self.tracker.check(user.id).await? {
            LoginGate::Allowed => {}
            LoginGate::Locked { .. } => return Err(AuthError::AccountLocked),
            LoginGate::CaptchaRequired => {
                self.enforce_captcha(request).await?;
            }
        }

        let hash = user
            .password_hash
            .as_deref()
            .ok_or_else(|| AuthError::invalid_grant("Invalid credentials"))?;
        let verified = PasswordHash::new(hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false);

        if !verified {
            let gate = self.tracker.record_failure(user.id).await?;
            return Err(match gate {
                LoginGate::Locked { .. } => AuthError::AccountLocked,
                _ => AuthError::invalid_grant("Invalid credentials"),
            });
        }

        self.tracker.record_success(user.id).await?;

        let subject = Subject::User(user.id);
        let scope = request.scope.as_deref().unwrap_or("openid");
        let access_token = self
            .mint_access_token(subject, user.organization_id, client, scope, Some("pwd"))
            .await?;

        let mut response = TokenResponse::new(
            access_token,
            self.access_lifetime(client).whole_seconds() as u64,
            scope.to_string(),
        );

        if has_scope(scope, "openid") {
            let now = OffsetDateTime::now_utc();
            let claims = IdTokenClaims {
                iss: self.config.issuer.clone(),
                sub: user.id.to_string(),
                aud: client.client_id.clone(),
                exp: (now + self.id_lifetime()).unix_timestamp(),
                iat: now.unix_timestamp(),
                nonce: None,
                preferred_username: Some(user.username.clone()),
                email: user.email.clone(),
            };
            response = response.with_id_token(self.sign(&claims).await?);
        }

        let (refresh_value, _) = self
            .ledger
            .issue_family(subject, user.organization_id, client, scope)
            .await?;
        response = response.with_refresh_token(refresh_value);

        AuditEvent::new(AuditKind::TokenIssued)
            .subject(subject)
            .client(&client.client_id)
            .detail("grant", "password")
            .record();

        Ok(response)
    }

    /// CAPTCHA gate: the attempt must carry a token that the verifier
    /// accepts. No verifier configured means the gate cannot pass.
    async fn enforce_captcha(&self, request: &TokenRequest) -> AuthResult<()> {
        let Some(token) = request.captcha_token.as_deref() else {
            return Err(AuthError::CaptchaRequired);
        };
        let Some(verifier) = &self.captcha else {
            return Err(AuthError::CaptchaRequired);
        };
        if verifier.verify(token).await? {
            Ok(())
        } else {
            AuditEvent::new(AuditKind::CaptchaGateRejected).record();
            Err(AuthError::CaptchaRequired)
        }
    }

    async fn mint_access_token(
        &self,
        subject: Subject,
        organization_id: Uuid,
        client: &Client,
        scope: &str,
        acr: Option<&str>,
    ) -> AuthResult<String> {
        let now = OffsetDateTime::now_utc();
        let claims = AccessTokenClaims {
            iss: self.config.issuer.clone(),
            sub: subject.to_string(),
            aud: vec![self.config.resource_audience.clone()],
            exp: (now + self.access_lifetime(client)).unix_timestamp(),
            iat: now.unix_timestamp(),
            jti: Uuid::new_v4().to_string(),
            scope: scope.to_string(),
            client_id: client.client_id.clone(),
            org_id: organization_id.to_string(),
            acr: acr.map(String::from),
        };
        self.sign(&claims).await
    }

    async fn mint_id_token(&self, code: &AuthorizationCode, client: &Client) -> AuthResult<String> {
        let user = self.user_storage.find_by_id(code.subject_id).await?;
        let now = OffsetDateTime::now_utc();
        let claims = IdTokenClaims {
            iss: self.config.issuer.clone(),
            sub: code.subject_id.to_string(),
            aud: client.client_id.clone(),
            exp: (now + self.id_lifetime()).unix_timestamp(),
            iat: now.unix_timestamp(),
            nonce: code.nonce.clone(),
            preferred_username: user.as_ref().map(|u| u.username.clone()),
            email: user.as_ref().and_then(|u| u.email.clone()),
        };
        self.sign(&claims).await
    }

    /// Signs claims with the ACTIVE key. No ACTIVE key is a 5xx-class
    /// failure; there is no stale-key fallback.
    async fn sign<T: serde::Serialize>(&self, claims: &T) -> AuthResult<String> {
        let pair = self.key_manager.active_signing_key().await?;
        pair.sign(claims)
            .map_err(|e| AuthError::internal(format!("Failed to sign token: {e}")))
    }

    fn access_lifetime(&self, client: &Client) -> Duration {
        client
            .access_token_lifetime
            .map(Duration::seconds)
            .unwrap_or_else(|| {
                Duration::seconds(self.config.oauth.access_token_lifetime.as_secs() as i64)
            })
    }

    fn id_lifetime(&self) -> Duration {
        Duration::seconds(self.config.oauth.id_token_lifetime.as_secs() as i64)
    }

    /// Records the audit detail for a rejected code exchange and
    /// returns the uniform grant error.
    fn reject_code(
        &self,
        code: &AuthorizationCode,
        client: &Client,
        reason: &'static str,
    ) -> AuthResult<TokenResponse> {
        AuditEvent::new(AuditKind::TokenRejected)
            .subject(Subject::User(code.subject_id))
            .client(&client.client_id)
            .detail("reason", reason)
            .record();
        Err(AuthError::invalid_grant("Invalid authorization code"))
    }

    /// Returns the refresh token ledger.
    #[must_use]
    pub fn ledger(&self) -> &Arc<RefreshTokenLedger> {
        &self.ledger
    }

    /// Returns the key manager.
    #[must_use]
    pub fn key_manager(&self) -> &Arc<KeyManager> {
        &self.key_manager
    }

    /// Returns the service configuration.
    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}

fn has_scope(scope: &str, wanted: &str) -> bool {
    scope.split_whitespace().any(|s| s == wanted)
}
