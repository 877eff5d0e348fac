//! Codecs for calendar types without a zone.
//!
//! Local date-times are interpreted in the system time zone and stored as a BSON datetime
//! (milliseconds since the Unix epoch). A date is stored as its local midnight. A time of
//! day is stored on 1970-01-01. Decoders also accept raw 32 and 64 bit millisecond counts.

use bson::Bson;
use chrono::{DateTime, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeDelta, TimeZone, Weekday};
use std::any::type_name;

use super::{CodecRegistry, ValueCodec};
use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Milliseconds since the epoch of a local date-time.
///
/// Ambiguous instants resolve to the earlier offset. Instants skipped by a daylight saving
/// transition take the offset in effect before the gap, so they land as far past the
/// transition as they were past its start.
pub fn local_to_millis(value: &NaiveDateTime) -> DocumentStoreResult<i64> {
    millis_in(&Local, value)
}

fn millis_in<Tz: TimeZone>(zone: &Tz, value: &NaiveDateTime) -> DocumentStoreResult<i64> {
    let offset = match zone.offset_from_local_datetime(value) {
        LocalResult::Single(offset) | LocalResult::Ambiguous(offset, _) => offset.fix(),
        LocalResult::None => {
            let before = value
                .checked_sub_signed(TimeDelta::days(1))
                .ok_or_else(|| out_of_range(value))?;
            zone.offset_from_utc_datetime(&before).fix()
        }
    };

    value
        .checked_sub_signed(TimeDelta::seconds(i64::from(offset.local_minus_utc())))
        .map(|utc| utc.and_utc().timestamp_millis())
        .ok_or_else(|| out_of_range(value))
}

fn out_of_range(value: &NaiveDateTime) -> DocumentStoreError {
    DocumentStoreError::InvalidDocument(format!("{value} is out of the supported range"))
}

/// Local date-time of an epoch millisecond count.
pub fn local_from_millis(millis: i64) -> DocumentStoreResult<NaiveDateTime> {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|instant| instant.naive_local())
        .ok_or_else(|| DocumentStoreError::InvalidDocument(format!("{millis} ms is out of the supported range")))
}

fn millis_of<T>(value: &Bson) -> DocumentStoreResult<i64> {
    match value {
        Bson::DateTime(instant) => Ok(instant.timestamp_millis()),
        Bson::Int64(millis) => Ok(*millis),
        Bson::Int32(millis) => Ok(i64::from(*millis)),
        other => Err(DocumentStoreError::unexpected(type_name::<T>(), other)),
    }
}

fn to_bson(millis: i64) -> Bson {
    Bson::DateTime(bson::DateTime::from_millis(millis))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDateTimeCodec;

impl ValueCodec for LocalDateTimeCodec {
    type Value = NaiveDateTime;

    fn encode_value(&self, value: &NaiveDateTime, _codecs: &CodecRegistry) -> DocumentStoreResult<Bson> {
        local_to_millis(value).map(to_bson)
    }

    fn decode_value(&self, value: Bson, _codecs: &CodecRegistry) -> DocumentStoreResult<NaiveDateTime> {
        local_from_millis(millis_of::<NaiveDateTime>(&value)?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDateCodec;

impl ValueCodec for LocalDateCodec {
    type Value = NaiveDate;

    fn encode_value(&self, value: &NaiveDate, _codecs: &CodecRegistry) -> DocumentStoreResult<Bson> {
        local_to_millis(&value.and_time(NaiveTime::MIN)).map(to_bson)
    }

    fn decode_value(&self, value: Bson, _codecs: &CodecRegistry) -> DocumentStoreResult<NaiveDate> {
        local_from_millis(millis_of::<NaiveDate>(&value)?).map(|local| local.date())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTimeCodec;

impl ValueCodec for LocalTimeCodec {
    type Value = NaiveTime;

    fn encode_value(&self, value: &NaiveTime, _codecs: &CodecRegistry) -> DocumentStoreResult<Bson> {
        local_to_millis(&DateTime::UNIX_EPOCH.date_naive().and_time(*value)).map(to_bson)
    }

    fn decode_value(&self, value: Bson, _codecs: &CodecRegistry) -> DocumentStoreResult<NaiveTime> {
        local_from_millis(millis_of::<NaiveTime>(&value)?).map(|local| local.time())
    }
}

/// Stores a weekday as its ISO-8601 number, Monday being 1 and Sunday 7.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeekdayCodec;

impl ValueCodec for WeekdayCodec {
    type Value = Weekday;

    fn encode_value(&self, value: &Weekday, _codecs: &CodecRegistry) -> DocumentStoreResult<Bson> {
        Ok(Bson::Int32(value.number_from_monday() as i32))
    }

    fn decode_value(&self, value: Bson, _codecs: &CodecRegistry) -> DocumentStoreResult<Weekday> {
        let number = match value {
            Bson::Int32(number) => i64::from(number),
            Bson::Int64(number) => number,
            other => return Err(DocumentStoreError::unexpected(type_name::<Weekday>(), &other)),
        };

        match number {
            1 => Ok(Weekday::Mon),
            2 => Ok(Weekday::Tue),
            3 => Ok(Weekday::Wed),
            4 => Ok(Weekday::Thu),
            5 => Ok(Weekday::Fri),
            6 => Ok(Weekday::Sat),
            7 => Ok(Weekday::Sun),
            _ => Err(DocumentStoreError::InvalidDocument(format!(
                "{number} is not an ISO weekday number"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Timelike};

    fn codecs() -> CodecRegistry {
        CodecRegistry::standard()
    }

    #[test]
    fn local_datetime_round_trips_at_millisecond_precision() {
        let value = NaiveDate::from_ymd_opt(2023, 7, 14)
            .unwrap()
            .and_hms_milli_opt(9, 30, 15, 250)
            .unwrap();

        let encoded = LocalDateTimeCodec.encode_value(&value, &codecs()).unwrap();
        assert!(matches!(encoded, Bson::DateTime(_)));
        assert_eq!(LocalDateTimeCodec.decode_value(encoded, &codecs()).unwrap(), value);
    }

    #[test]
    fn sub_millisecond_precision_is_truncated() {
        let value = NaiveDate::from_ymd_opt(2023, 7, 14)
            .unwrap()
            .and_hms_nano_opt(9, 30, 15, 250_999_999)
            .unwrap();

        let encoded = LocalDateTimeCodec.encode_value(&value, &codecs()).unwrap();
        let decoded = LocalDateTimeCodec.decode_value(encoded, &codecs()).unwrap();
        assert_eq!(decoded.nanosecond(), 250_000_000);
    }

    #[test]
    fn date_is_stored_at_local_midnight() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 31).unwrap();

        let encoded = LocalDateCodec.encode_value(&date, &codecs()).unwrap();
        let millis = encoded.as_datetime().unwrap().timestamp_millis();
        assert_eq!(local_from_millis(millis).unwrap().time(), NaiveTime::MIN);
        assert_eq!(LocalDateCodec.decode_value(encoded, &codecs()).unwrap(), date);
    }

    #[test]
    fn time_round_trips() {
        let time = NaiveTime::from_hms_milli_opt(23, 59, 58, 7).unwrap();

        let encoded = LocalTimeCodec.encode_value(&time, &codecs()).unwrap();
        assert_eq!(LocalTimeCodec.decode_value(encoded, &codecs()).unwrap(), time);
    }

    #[test]
    fn raw_millisecond_counts_are_accepted() {
        let value = NaiveDate::from_ymd_opt(2001, 9, 9).unwrap().and_hms_opt(1, 46, 40).unwrap();
        let millis = local_to_millis(&value).unwrap();

        assert_eq!(LocalDateTimeCodec.decode_value(Bson::Int64(millis), &codecs()).unwrap(), value);
    }

    /// Central European rules for 2024: clocks jump from 02:00 to 03:00 on March 31st.
    #[derive(Debug, Clone, Copy)]
    struct Berlin2024;

    impl Berlin2024 {
        fn winter() -> FixedOffset {
            FixedOffset::east_opt(3600).unwrap()
        }

        fn summer() -> FixedOffset {
            FixedOffset::east_opt(7200).unwrap()
        }

        fn switch_utc() -> NaiveDateTime {
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap().and_hms_opt(1, 0, 0).unwrap()
        }
    }

    impl TimeZone for Berlin2024 {
        type Offset = FixedOffset;

        fn from_offset(_offset: &FixedOffset) -> Self {
            Berlin2024
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
            self.offset_from_local_datetime(&local.and_time(NaiveTime::MIN))
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            let gap_start = Self::switch_utc() + TimeDelta::hours(1);
            let gap_end = Self::switch_utc() + TimeDelta::hours(2);
            if *local < gap_start {
                LocalResult::Single(Self::winter())
            } else if *local < gap_end {
                LocalResult::None
            } else {
                LocalResult::Single(Self::summer())
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_time(NaiveTime::MIN))
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            if *utc < Self::switch_utc() {
                Self::winter()
            } else {
                Self::summer()
            }
        }
    }

    fn utc_millis(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> i64 {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis()
    }

    #[test]
    fn skipped_local_times_move_past_the_gap() {
        let in_gap = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap().and_hms_opt(2, 30, 0).unwrap();

        let millis = millis_in(&Berlin2024, &in_gap).unwrap();

        assert_eq!(millis, utc_millis(2024, 3, 31, 1, 30));
        let landed = Berlin2024.timestamp_millis_opt(millis).unwrap().naive_local();
        assert_eq!(landed.time(), NaiveTime::from_hms_opt(3, 30, 0).unwrap());
    }

    #[test]
    fn offsets_on_either_side_of_the_gap_are_kept() {
        let before = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap().and_hms_opt(1, 59, 0).unwrap();
        let after = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap().and_hms_opt(3, 0, 0).unwrap();

        assert_eq!(millis_in(&Berlin2024, &before).unwrap(), utc_millis(2024, 3, 31, 0, 59));
        assert_eq!(millis_in(&Berlin2024, &after).unwrap(), utc_millis(2024, 3, 31, 1, 0));
    }

    #[test]
    fn weekday_uses_iso_numbers() {
        assert_eq!(WeekdayCodec.encode_value(&Weekday::Mon, &codecs()).unwrap(), Bson::Int32(1));
        assert_eq!(WeekdayCodec.encode_value(&Weekday::Sun, &codecs()).unwrap(), Bson::Int32(7));
        assert_eq!(WeekdayCodec.decode_value(Bson::Int32(3), &codecs()).unwrap(), Weekday::Wed);
        assert!(matches!(
            WeekdayCodec.decode_value(Bson::Int32(0), &codecs()),
            Err(DocumentStoreError::InvalidDocument(_))
        ));
    }
}
