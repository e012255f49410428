//! Subscribe and unsubscribe operations.

use futures_util::SinkExt;
use tracing::{debug, info};
use tungstenite::Message;

use super::FrameSink;
use crate::Result;
use crate::models::SubscriptionRequest;

/// Sends the subscribe frame for `request`.
///
/// # Errors
///
/// Returns an [`AlorError`](crate::AlorError) if serializing or sending
/// the frame fails.
pub async fn send_subscribe(write: &mut FrameSink, request: &SubscriptionRequest) -> Result<()> {
    let json = request.to_frame()?;
    debug!(guid = request.guid(), ?request, "Sending subscribe request");
    write.send(Message::Text(json.into())).await?;
    info!(
        opcode = request.opcode.as_str(),
        guid = request.guid(),
        "Subscribed to feed"
    );

    Ok(())
}

/// Sends the unsubscribe frame for `request`.
///
/// # Errors
///
/// Returns an [`AlorError`](crate::AlorError) if serializing or sending
/// the frame fails.
pub async fn send_unsubscribe(
    write: &mut FrameSink,
    request: &SubscriptionRequest,
) -> Result<()> {
    let json = request.unsubscribe().to_frame()?;
    write.send(Message::Text(json.into())).await?;
    info!(guid = request.guid(), "Unsubscribed from feed");

    Ok(())
}
