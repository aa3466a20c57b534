//! Compensation for rotations whose response never left the server.

use tracing::{debug, warn};

use crate::tokens::{Rotation, TokenController};

/// Armed once a request rotated its session and minted a replacement.
///
/// If the request future is dropped before the response is produced (the
/// client went away), the new credentials can never arrive, so the guard
/// spawns `TokenController::recover` on the current runtime.
pub(super) struct RecoverGuard {
    controller: TokenController,
    pending: Option<(Rotation, String)>,
}

impl RecoverGuard {
    pub(super) fn arm(controller: TokenController, rotation: Rotation, issued_refresh: String) -> Self {
        Self {
            controller,
            pending: Some((rotation, issued_refresh)),
        }
    }

    /// The response exists; the new credentials go out with it.
    pub(super) fn disarm(mut self) {
        self.pending = None;
    }
}

impl Drop for RecoverGuard {
    fn drop(&mut self) {
        let Some((rotation, issued)) = self.pending.take() else {
            return;
        };

        debug!(session_id = %rotation.session_id, "Request cancelled after rotation");

        let controller = self.controller.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    controller.recover(&rotation, Some(&issued)).await;
                });
            }
            Err(_) => {
                warn!(session_id = %rotation.session_id, "No runtime to recover rotated session");
            }
        }
    }
}
