// ── Sample fetching ──
//
// The vendor's `after` parameter is undocumented: some accounts answer to
// epoch milliseconds, others to epoch seconds. Requests go out in
// milliseconds first and are repeated in seconds when the first answer
// is empty.

use tracing::{debug, trace};
use wifipool_api::{Sample, TelemetryClient};

use crate::error::CoreError;
use crate::model::ChannelId;

/// Fetch samples for `channel` newer than `after_ms`, retrying with
/// `floor(after_ms / 1000)` when the millisecond request comes back empty.
///
/// The result is ordered oldest to newest; samples without a timestamp
/// sort first.
pub async fn fetch_with_fallback(
    client: &TelemetryClient,
    domain: &str,
    channel: &ChannelId,
    after_ms: i64,
) -> Result<Vec<Sample>, CoreError> {
    let io = channel.to_string();

    let mut samples = client.get_samples(domain, &io, after_ms).await?;
    if samples.is_empty() {
        let after_secs = after_ms.div_euclid(1000);
        if after_secs == after_ms {
            trace!(channel = %channel, "no samples");
        } else {
            debug!(channel = %channel, after_ms, after_secs, "empty in ms, retrying in seconds");
            samples = client.get_samples(domain, &io, after_secs).await?;
        }
    }

    samples.sort_by_key(|s| s.timestamp);
    Ok(samples)
}

/// Fetch samples with `after = 0`, i.e. whatever the vendor considers the
/// most recent window. Used for switch state where the newest toggle
/// matters regardless of age.
pub async fn fetch_latest(
    client: &TelemetryClient,
    domain: &str,
    channel: &ChannelId,
) -> Result<Vec<Sample>, CoreError> {
    fetch_with_fallback(client, domain, channel, 0).await
}
