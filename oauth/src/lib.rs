mod error;
mod html;
mod pkce;
mod server;

pub use error::OAuthErr;
pub use pkce::PkceCodes;
pub use pkce::generate_pkce;
pub use pkce::generate_state;
pub use server::CallbackOptions;
pub use server::CancelHandle;
pub use server::OAuthCallbackServer;
pub use server::PendingLogin;
