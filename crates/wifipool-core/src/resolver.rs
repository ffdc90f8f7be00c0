// ── Domain / device resolution ──
//
// `groups/accessible` returns a loosely structured list in which the pool
// domain, device ids, the account's own user id and group creators all
// look alike. Candidates are narrowed by exclusion, ordered with
// well-known fields first, and confirmed one at a time by asking the
// vendor for the group's IO inventory.

use indexmap::IndexSet;
use serde_json::Value;
use tracing::{debug, info, warn};
use wifipool_api::{GroupInfo, TelemetryClient};

use crate::error::CoreError;
use crate::json_walk::{
    collect_creator_ids, collect_device_ids, collect_uuids, collect_uuids_under_keys,
};

/// Group fields that name the domain directly when present.
pub const LIKELY_DOMAIN_KEYS: [&str; 4] =
    ["mobile_group_uuid", "mobile_group_id", "domainId", "groupId"];

/// Outcome of a successful resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub domain: String,
    pub device_uuid: String,
    /// The accepted candidate's `getInfo` response.
    pub info: GroupInfo,
    /// Candidates in the order they were tried.
    pub candidates: Vec<String>,
}

/// Rank domain candidates from a `groups/accessible` payload.
///
/// Fails with `NoGroups` when the payload is not a non-empty array.
pub fn domain_candidates(
    groups: &Value,
    login_user_id: Option<&str>,
) -> Result<Vec<String>, CoreError> {
    let list = match groups.as_array() {
        Some(list) if !list.is_empty() => list,
        _ => return Err(CoreError::NoGroups),
    };

    let mut excluded = collect_device_ids(groups);
    excluded.extend(collect_creator_ids(list));
    if let Some(user) = login_user_id {
        excluded.insert(user.to_owned());
    }

    let likely = collect_uuids_under_keys(groups, &LIKELY_DOMAIN_KEYS);
    let all = collect_uuids(groups);

    let candidates: IndexSet<String> = likely
        .into_iter()
        .chain(all)
        .filter(|id| !excluded.contains(id))
        .collect();

    debug!(
        candidates = candidates.len(),
        excluded = excluded.len(),
        "domain candidates ranked"
    );
    Ok(candidates.into_iter().collect())
}

/// Try candidates in order and accept the first whose group info lists a
/// non-empty IO inventory.
///
/// Failing candidates are skipped; only a configuration error (which no
/// later candidate could fix) aborts early.
pub async fn confirm_domain(
    client: &TelemetryClient,
    candidates: &[String],
) -> Result<(String, GroupInfo), CoreError> {
    for candidate in candidates {
        match client.get_group_info(candidate).await {
            Ok(info) if info.io_len() > 0 => {
                info!(domain = %candidate, io = info.io_len(), "domain resolved");
                return Ok((candidate.clone(), info));
            }
            Ok(_) => debug!(candidate = %candidate, "rejected: no io inventory"),
            Err(e) => {
                let err = CoreError::from(e);
                if matches!(err, CoreError::Configuration { .. }) {
                    return Err(err);
                }
                warn!(candidate = %candidate, error = %err, "rejected");
            }
        }
    }
    Err(CoreError::DomainResolution {
        tried: candidates.len(),
    })
}

/// The first device listed in a group's inventory.
pub fn first_device(domain: &str, info: &GroupInfo) -> Result<String, CoreError> {
    info.first_device_id()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| CoreError::DeviceNotFound {
            domain: domain.to_owned(),
        })
}

/// Full resolution: list groups, rank candidates, confirm a domain, and
/// pick its device.
pub async fn resolve(
    client: &TelemetryClient,
    login_user_id: Option<&str>,
) -> Result<Resolution, CoreError> {
    let groups = client.list_accessible_groups().await?;
    let candidates = domain_candidates(&groups, login_user_id)?;
    let (domain, info) = confirm_domain(client, &candidates).await?;
    let device_uuid = first_device(&domain, &info)?;

    info!(domain = %domain, device = %device_uuid, "device resolved");

    Ok(Resolution {
        domain,
        device_uuid,
        info,
        candidates,
    })
}
