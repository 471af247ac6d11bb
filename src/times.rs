use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use chrono_tz::US::Central;

/// Fixed localization target for the secondary timestamp column.
pub const TARGET_TZ: Tz = Central;

/// Epoch seconds (UTC) → canonical UTC instant plus the same instant
/// localized to [`TARGET_TZ`]. Pure; DST handled by the tz rule table.
pub fn normalize(epoch_secs: i64) -> Result<(DateTime<Utc>, DateTime<Tz>)> {
    let utc = DateTime::from_timestamp(epoch_secs, 0)
        .ok_or_else(|| anyhow!("timestamp out of range: {epoch_secs}"))?;
    Ok((utc, utc.with_timezone(&TARGET_TZ)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_instant_maps_to_utc_and_cst() {
        let (utc, central) = normalize(1_700_000_000).unwrap();
        assert_eq!(utc.to_rfc3339(), "2023-11-14T22:13:20+00:00");
        // mid-November is CST, UTC-6
        assert_eq!(central.to_rfc3339(), "2023-11-14T16:13:20-06:00");
    }

    #[test]
    fn summer_instant_is_dst_adjusted() {
        // 2023-07-01T00:00:00Z falls in CDT, UTC-5
        let (_, central) = normalize(1_688_169_600).unwrap();
        assert_eq!(central.to_rfc3339(), "2023-06-30T19:00:00-05:00");
    }

    #[test]
    fn localized_carries_no_independent_information() {
        let (utc, central) = normalize(1_700_000_000).unwrap();
        assert_eq!(central.with_timezone(&Utc), utc);
    }
}
