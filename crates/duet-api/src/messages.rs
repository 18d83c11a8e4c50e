use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::{debug, warn};
use uuid::Uuid;

use duet_gateway::Delivery;
use duet_types::api::SendMessageRequest;
use duet_types::events::GatewayEvent;
use duet_types::models::MessageRecord;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::middleware::AuthUser;

/// GET /api/messages/{user_id}: the whole conversation with one user,
/// oldest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(other_id): Path<Uuid>,
    Extension(AuthUser(me)): Extension<AuthUser>,
) -> Result<Json<Vec<MessageRecord>>, ApiError> {
    let db = state.clone();
    let (mine, theirs) = (me.id.to_string(), other_id.to_string());
    let rows = blocking(move || db.db.get_conversation(&mine, &theirs)).await?;

    let messages = rows
        .iter()
        .filter_map(|row| match row.to_record() {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping corrupt message row '{}': {:#}", row.id, e);
                None
            }
        })
        .collect();

    Ok(Json(messages))
}

/// POST /api/messages/send/{receiver_id}
///
/// Stores the message, then pushes it to the receiver if they are connected.
/// The response is the stored record whether or not the push happened.
pub async fn send_message(
    State(state): State<AppState>,
    Path(receiver_id): Path<Uuid>,
    Extension(AuthUser(me)): Extension<AuthUser>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<MessageRecord>, ApiError> {
    let text = req.text.filter(|t| !t.trim().is_empty());
    let image = req.image.filter(|i| !i.trim().is_empty());
    if text.is_none() && image.is_none() {
        return Err(ApiError::bad_request("Message must have text or an image"));
    }

    let db = state.clone();
    let rid = receiver_id.to_string();
    if blocking(move || db.db.get_user_by_id(&rid)).await?.is_none() {
        return Err(ApiError::bad_request("Receiver not found"));
    }

    let image_url = match image {
        Some(data) => Some(state.media.upload(&data).await?),
        None => None,
    };

    let db = state.clone();
    let (sid, rid) = (me.id.to_string(), receiver_id.to_string());
    let row = blocking(move || {
        db.db
            .insert_message(&sid, &rid, text.as_deref(), image_url.as_deref())
    })
    .await?;
    let record = row.to_record()?;

    // Stored already, so a missed push only means the receiver sees it on
    // their next history fetch.
    match state
        .dispatcher
        .deliver(receiver_id, GatewayEvent::NewMessage(record.clone()))
        .await
    {
        Delivery::Sent(_) => {}
        Delivery::Offline => debug!("Receiver {} offline, message {} not pushed", receiver_id, record.id),
        Delivery::Dropped(conn_id) => {
            debug!("Push of message {} lost with connection {}", record.id, conn_id)
        }
    }

    Ok(Json(record))
}
