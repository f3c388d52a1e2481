//! User-facing prompts mediated by the host UI.

use async_trait::async_trait;

use crate::application::Application;
use crate::permission::Permission;
use crate::rpc::RpcRequest;

/// Host-side callbacks rendering approval prompts to the user.
///
/// Both methods block their caller until the user answers; the dispatcher
/// guarantees at most one prompt is outstanding at any time, and a prompt
/// whose session dies mid-flight is abandoned by the gateway (the handler's
/// eventual answer is discarded).
#[async_trait]
pub trait PromptHandler: Send + Sync {
    /// Ask the user to accept or reject a connecting application.
    async fn authorize_application(&self, app: &Application) -> bool;

    /// Ask the user to grant or refuse one method invocation.
    async fn request_permission(&self, app: &Application, request: &RpcRequest) -> Permission;
}
