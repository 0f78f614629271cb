//! Datapoint to Point transform
//!
//! A pure mapping from a decoded stream event to the time-series record the
//! store receives. Events without a timestamp or a payload are dropped rather
//! than errored, so malformed upstream events never halt the pipeline.

use crate::core::{
    datapoint::Payload, decode_value, CodecFault, Datapoint, Point, MINT_COLLECTION_TAG,
    MINT_SERIES, MINT_USER_KEY, ORGANIZATION_TAG, PROJECT_TAG,
};
use chrono::{DateTime, Utc};

/// Map one datapoint into a point.
///
/// Returns `Ok(None)` when the event is not storable. Tenant tags are applied
/// last, so a generic payload cannot override `organization_id` or
/// `project_id`. The only error is a [`CodecFault`] from a field value whose
/// variant is unknown.
pub fn transform(datapoint: &Datapoint) -> Result<Option<Point>, CodecFault> {
    let Some(time) = datapoint.ts.as_ref().and_then(timestamp_to_datetime) else {
        return Ok(None);
    };
    let Some(payload) = &datapoint.payload else {
        return Ok(None);
    };

    let mut point = match payload {
        Payload::Mint(mint) => Point::new(MINT_SERIES, time)
            .tag(MINT_COLLECTION_TAG, &mint.collection_id)
            .field(MINT_USER_KEY, mint.user_id.as_str()),
        Payload::Series(series) => {
            if series.series.is_empty() {
                return Ok(None);
            }
            let mut point = Point::new(&series.series, time);
            point.tags.extend(series.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
            for (name, value) in &series.fields {
                let decoded = decode_value(value).map_err(|fault| {
                    tracing::error!(series = %series.series, field = %name, "{}", fault);
                    fault
                })?;
                point.fields.insert(name.clone(), decoded);
            }
            point
        }
    };

    point.tags.insert(ORGANIZATION_TAG.to_string(), datapoint.organization_id.clone());
    point.tags.insert(PROJECT_TAG.to_string(), datapoint.project_id.clone());

    Ok(Some(point))
}

/// Convert a protobuf timestamp, rejecting values chrono cannot represent.
pub fn timestamp_to_datetime(ts: &prost_types::Timestamp) -> Option<DateTime<Utc>> {
    let nanos = u32::try_from(ts.nanos).ok()?;
    DateTime::from_timestamp(ts.seconds, nanos)
}
