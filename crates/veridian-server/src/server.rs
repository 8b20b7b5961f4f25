//! Router and application state assembly.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use veridian_auth::config::AuthConfig;
use veridian_auth::device::DeviceProofVerifier;
use veridian_auth::http::{
    DiscoveryState, IntrospectionState, JwksState, RevocationState, TokenState, UserInfoState,
    introspect_handler, jwks_handler, openid_configuration_handler, revoke_handler, token_handler,
    userinfo_handler,
};
use veridian_auth::keys::{KeyEncryptionKey, KeyManager};
use veridian_auth::ledger::RefreshTokenLedger;
use veridian_auth::lockout::LoginSecurityTracker;
use veridian_auth::middleware::{DeviceProofLayerState, require_device_proof};
use veridian_auth::token::TokenService;
use veridian_auth::token::jwt::SigningAlgorithm;

use veridian_storage_memory::{
    MemoryClientStorage, MemoryCodeStorage, MemoryDeviceStorage, MemoryJtiStorage,
    MemoryKeyStorage, MemoryLoginAttemptStorage, MemoryRefreshTokenStorage, MemoryUserStorage,
};

/// Shared application state.
pub struct App {
    /// Grant orchestrator.
    pub token_service: Arc<TokenService>,
    /// Key manager.
    pub key_manager: Arc<KeyManager>,
    /// Refresh token ledger.
    pub ledger: Arc<RefreshTokenLedger>,
    /// Client registry.
    pub client_storage: Arc<MemoryClientStorage>,
    /// User store.
    pub user_storage: Arc<MemoryUserStorage>,
    /// Device proof verifier.
    pub device_verifier: Arc<DeviceProofVerifier>,
    /// Engine configuration.
    pub config: AuthConfig,
}

impl App {
    /// Builds the application with in-memory backends.
    ///
    /// An empty `key_encryption_key` generates an ephemeral KEK and
    /// logs its base64 form for development use; production supplies
    /// one through the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured KEK is malformed or key
    /// provisioning fails.
    pub async fn build(config: AuthConfig) -> anyhow::Result<Self> {
        let kek = if config.signing.key_encryption_key.is_empty() {
            let (kek, encoded) = KeyEncryptionKey::generate();
            tracing::warn!("No key encryption key configured; generated an ephemeral one");
            tracing::warn!(
                "Set VERIDIAN__AUTH__SIGNING__KEY_ENCRYPTION_KEY={encoded} to persist key material across restarts"
            );
            kek
        } else {
            KeyEncryptionKey::from_base64(&config.signing.key_encryption_key)?
        };

        let algorithm = SigningAlgorithm::parse(&config.signing.algorithm)
            .ok_or_else(|| anyhow::anyhow!("unsupported signing algorithm"))?;

        let key_manager = Arc::new(KeyManager::new(
            Arc::new(MemoryKeyStorage::new()),
            kek,
            algorithm,
        ));
        key_manager.ensure_active_key().await?;

        let client_storage = Arc::new(MemoryClientStorage::new());
        let user_storage = Arc::new(MemoryUserStorage::new());
        let code_storage = Arc::new(MemoryCodeStorage::new());
        let ledger = Arc::new(RefreshTokenLedger::new(
            Arc::new(MemoryRefreshTokenStorage::new()),
            config.oauth.clone(),
        ));
        let tracker = Arc::new(LoginSecurityTracker::new(
            Arc::new(MemoryLoginAttemptStorage::new()),
            Arc::new(MemoryLoginAttemptStorage::new()),
            config.lockout.clone(),
        ));
        let device_verifier = Arc::new(DeviceProofVerifier::new(
            Arc::new(MemoryDeviceStorage::new()),
            Arc::new(MemoryJtiStorage::new()),
            config.device.clone(),
        ));

        let token_service = Arc::new(TokenService::new(
            key_manager.clone(),
            code_storage,
            ledger.clone(),
            user_storage.clone(),
            tracker,
            config.clone(),
        ));

        Ok(Self {
            token_service,
            key_manager,
            ledger,
            client_storage,
            user_storage,
            device_verifier,
            config,
        })
    }

    /// Builds the HTTP router for the public surface.
    pub fn router(&self) -> Router {
        let discovery = DiscoveryState::new(self.config.clone());
        let jwks = JwksState::new(
            self.key_manager.clone(),
            self.config.signing.jwks_max_age_secs,
        );
        let token = TokenState::new(self.token_service.clone(), self.client_storage.clone());
        let revoke = RevocationState::new(self.ledger.clone(), self.client_storage.clone());
        let introspect = IntrospectionState::new(
            self.key_manager.clone(),
            self.ledger.clone(),
            self.client_storage.clone(),
            self.config.clone(),
        );
        let userinfo = UserInfoState::new(
            self.key_manager.clone(),
            self.user_storage.clone(),
            self.config.clone(),
        );

        // Device-facing mirror of the token endpoint: registered
        // devices refresh their sessions here and must attach a
        // proof-of-possession to every request.
        let device_routes = Router::new()
            .route(
                "/device/oauth/token",
                post(token_handler).with_state(token.clone()),
            )
            .layer(axum::middleware::from_fn_with_state(
                DeviceProofLayerState::new(self.device_verifier.clone()),
                require_device_proof,
            ));

        Router::new()
            .route(
                "/.well-known/openid-configuration",
                get(openid_configuration_handler).with_state(discovery),
            )
            .route("/jwks.json", get(jwks_handler).with_state(jwks))
            .route("/oauth/token", post(token_handler).with_state(token))
            .route("/oauth/revoke", post(revoke_handler).with_state(revoke))
            .route(
                "/introspect",
                post(introspect_handler).with_state(introspect),
            )
            .route("/userinfo", get(userinfo_handler).with_state(userinfo))
            .merge(device_routes)
            .layer(TraceLayer::new_for_http())
    }
}
