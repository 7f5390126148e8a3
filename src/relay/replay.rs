//! History replay: feed prior turns into the session without asking for a
//! response.

use tracing::{debug, warn};

use crate::conversation::NormalizedTurn;
use crate::error::RelayError;
use crate::upstream::{LiveSession, OutgoingTurn};

/// Send every history turn in order, one at a time.
///
/// Each send completes before the next starts. The first rejected send
/// stops the replay; nothing is retried.
pub async fn replay_history(
    session: &mut dyn LiveSession,
    history: &[NormalizedTurn],
) -> Result<(), RelayError> {
    for (index, turn) in history.iter().enumerate() {
        let outgoing = OutgoingTurn {
            role: turn.role,
            parts: &turn.parts,
            end_of_turn: false,
        };
        if let Err(e) = session.send(outgoing).await {
            warn!(index, role = %turn.role, "History replay failed: {e}");
            return Err(RelayError::SendFailure {
                index,
                message: e.to_string(),
            });
        }
    }

    debug!(turns = history.len(), "History replayed");
    Ok(())
}
