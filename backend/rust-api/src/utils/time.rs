use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;

pub fn chrono_to_bson(dt: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(dt.timestamp_millis())
}

/// Rounds a percentage-like value to two decimals for storage and display.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round2_keeps_two_decimals() {
        assert_eq!(round2(66.666_666), 66.67);
        assert_eq!(round2(50.0), 50.0);
    }

    #[test]
    fn chrono_to_bson_preserves_millis() {
        let now = Utc::now();
        assert_eq!(chrono_to_bson(now).timestamp_millis(), now.timestamp_millis());
    }
}
