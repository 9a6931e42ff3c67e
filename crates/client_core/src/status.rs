use shared::domain::{CachedConversationRecord, ChatMessage, DeliveryStatus, MessageId};

/// Monotonic transition rule: a status update is applied only when it moves
/// strictly forward in `sent < delivered < read`. Stale or duplicate
/// updates return `None` and leave the current status untouched, so the
/// final status of any update sequence is the maximum regardless of
/// arrival order.
pub fn merge_status(
    current: (DeliveryStatus, i64),
    incoming: (DeliveryStatus, i64),
) -> Option<(DeliveryStatus, i64)> {
    if incoming.0 > current.0 {
        Some(incoming)
    } else {
        None
    }
}

/// Applies a status update to the message with the given identifier.
/// Returns `false` when the message is not in the list (not yet loaded) or
/// the update is stale; dropped updates reconcile from the cache on the
/// next load.
pub fn apply_status_to_list(
    list: &mut [ChatMessage],
    message_id: &MessageId,
    status: DeliveryStatus,
    timestamp: i64,
) -> bool {
    for message in list.iter_mut() {
        if &message.id == message_id {
            if let Some((status, timestamp)) =
                merge_status((message.status, message.status_timestamp), (status, timestamp))
            {
                message.status = status;
                message.status_timestamp = timestamp;
                return true;
            }
            return false;
        }
    }
    false
}

/// The furthest status recorded in the cache for a message id. The cache
/// list may hold several entries with the same id (the original message
/// plus status-confirmation markers); the maximum wins.
pub fn max_cached_status(
    record: &CachedConversationRecord,
    message_id: &MessageId,
) -> Option<(DeliveryStatus, i64)> {
    record
        .message_list
        .iter()
        .filter(|message| &message.id == message_id)
        .map(|message| (message.status, message.status_timestamp))
        .max_by_key(|(status, _)| *status)
}
