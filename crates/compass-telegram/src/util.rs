use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Split the comma-separated `TELEGRAM_ALLOWED_UPDATES` value, dropping
/// blank segments.
pub fn parse_allowed_updates(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(String::from)
        .collect()
}

/// Chat IDs are user-identifying; logs only ever see a masked form.
pub fn mask_chat_id(chat_id: i64) -> String {
    let raw = chat_id.to_string();
    if raw.len() <= 4 {
        return "****".to_string();
    }
    format!("{}***{}", &raw[..2], &raw[raw.len() - 2..])
}

/// Sleep that returns early on cancellation. `true` means the full
/// duration elapsed.
pub(crate) async fn sleep_with_cancel(token: &CancellationToken, duration: Duration) -> bool {
    if duration.is_zero() {
        return true;
    }
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
