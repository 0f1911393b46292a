//! Recovery of UTC offsets for naive timestamps.
//!
//! Older archives record timestamps in the local time of the recording
//! machine, without an offset. Session metadata carries the offset at the
//! session's start and end; when the two differ (a DST transition happened
//! mid-session) the transition point has to be located in the data itself.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta, Utc};

use crate::error::{IcdataError, Result};
use crate::nodes::Session;

/// Converts a naive local timestamp with a known offset to UTC.
pub fn localize(naive: NaiveDateTime, offset: FixedOffset) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(naive - offset, Utc)
}

/// Assigns a UTC offset to each of a file's timestamps, given the session
/// they were recorded in. `times` must be ascending in recording order.
///
/// When the session's start and end offsets agree every timestamp gets that
/// offset. When they differ, the single inter-timestamp gap compatible with
/// the clock change locates the transition: a forward change leaves exactly
/// one gap at least as long as the change, a backward change leaves exactly
/// one apparent backwards jump. Anything else is ambiguous and refused
/// rather than guessed.
pub fn infer_offsets(
    times: &[NaiveDateTime],
    session: &Session,
) -> Result<Vec<FixedOffset>> {
    let start_offset = *session.start.offset();
    let end_offset = match session.end {
        Some(end) => *end.offset(),
        None => start_offset,
    };
    if start_offset == end_offset || times.len() < 2 {
        return Ok(vec![start_offset; times.len()]);
    }

    let change = TimeDelta::seconds(
        (end_offset.local_minus_utc() - start_offset.local_minus_utc()) as i64,
    );
    let split = find_transition(times, change)?;
    Ok(times
        .iter()
        .enumerate()
        .map(|(i, _)| if i <= split { start_offset } else { end_offset })
        .collect())
}

/// The index of the last timestamp still on the pre-change offset.
fn find_transition(times: &[NaiveDateTime], change: TimeDelta) -> Result<usize> {
    let gaps: Vec<TimeDelta> = times.windows(2).map(|w| w[1] - w[0]).collect();
    let candidates: Vec<usize> = if change > TimeDelta::zero() {
        // clock moved forward: the real gap appears lengthened by `change`
        gaps.iter().enumerate().filter(|(_, g)| **g >= change).map(|(i, _)| i).collect()
    } else {
        // clock moved back: the only place timestamps can run backwards
        gaps.iter().enumerate().filter(|(_, g)| **g < TimeDelta::zero()).map(|(i, _)| i).collect()
    };
    match candidates.as_slice() {
        [index] => Ok(*index),
        [] => Err(IcdataError::AmbiguousTimezoneChange(
            "no gap compatible with the recorded offset change".to_string(),
        )),
        many => Err(IcdataError::AmbiguousTimezoneChange(format!(
            "{} gaps compatible with the recorded offset change",
            many.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn naive(h: u32, m: u32) -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2012, 10, 28)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn session(start_offset_h: i32, end_offset_h: Option<i32>) -> Session {
        let start = FixedOffset::east_opt(start_offset_h * 3600)
            .unwrap()
            .with_ymd_and_hms(2012, 10, 28, 0, 0, 0)
            .unwrap();
        let end = end_offset_h.map(|h| {
            FixedOffset::east_opt(h * 3600)
                .unwrap()
                .with_ymd_and_hms(2012, 10, 28, 23, 0, 0)
                .unwrap()
        });
        Session { start, end }
    }

    #[test]
    fn constant_offset_applies_everywhere() {
        let times = [naive(1, 0), naive(2, 0), naive(3, 0)];
        let offsets = infer_offsets(&times, &session(2, Some(2))).unwrap();
        assert_eq!(offsets, vec![FixedOffset::east_opt(7200).unwrap(); 3]);
    }

    #[test]
    fn backward_change_splits_at_the_backwards_jump() {
        // CEST -> CET: clocks go from 3:00 back to 2:00
        let times = [naive(1, 30), naive(2, 50), naive(2, 10), naive(2, 40)];
        let offsets = infer_offsets(&times, &session(2, Some(1))).unwrap();
        assert_eq!(offsets[0], FixedOffset::east_opt(7200).unwrap());
        assert_eq!(offsets[1], FixedOffset::east_opt(7200).unwrap());
        assert_eq!(offsets[2], FixedOffset::east_opt(3600).unwrap());
        assert_eq!(offsets[3], FixedOffset::east_opt(3600).unwrap());
    }

    #[test]
    fn forward_change_splits_at_the_lengthened_gap() {
        // CET -> CEST with dense sampling: only the transition gap exceeds 1h
        let times = [naive(1, 40), naive(1, 50), naive(3, 5), naive(3, 15)];
        let offsets = infer_offsets(&times, &session(1, Some(2))).unwrap();
        assert_eq!(offsets[1], FixedOffset::east_opt(3600).unwrap());
        assert_eq!(offsets[2], FixedOffset::east_opt(7200).unwrap());
    }

    #[test]
    fn undecidable_data_is_refused() {
        // two gaps over an hour: cannot tell which one hides the change
        let times = [naive(1, 0), naive(3, 0), naive(5, 0)];
        assert!(matches!(
            infer_offsets(&times, &session(1, Some(2))),
            Err(IcdataError::AmbiguousTimezoneChange(_))
        ));
    }

    #[test]
    fn open_session_uses_the_start_offset() {
        let times = [naive(1, 0)];
        let offsets = infer_offsets(&times, &session(1, None)).unwrap();
        assert_eq!(offsets, vec![FixedOffset::east_opt(3600).unwrap()]);
    }
}
