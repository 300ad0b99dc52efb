use crate::model::{Condition, ExpectedValue, Trigger};
use log::{debug, warn};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static CLOCK_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})\s*:\s*(\d{1,2})$").expect("clock pattern is valid")
});

static HANZI_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})\s*时\s*(\d{1,2})\s*分?$").expect("hanzi clock pattern is valid")
});

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeReport {
    pub newly_active: Vec<Trigger>,
    pub newly_inactive: Vec<Trigger>,
}

impl EdgeReport {
    pub fn is_empty(&self) -> bool {
        self.newly_active.is_empty() && self.newly_inactive.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Comparator<'a> {
    Contains(&'a str),
    TimeRange(&'a str),
    Equals(&'a ExpectedValue),
    Above(f64),
    AtLeast(f64),
    Below(f64),
    AtMost(f64),
}

fn comparator(condition: &Condition) -> Option<Comparator<'_>> {
    let mut present = [
        condition.value_contains.as_deref().map(Comparator::Contains),
        condition.time_in_range.as_deref().map(Comparator::TimeRange),
        condition.value.as_ref().map(Comparator::Equals),
        condition.greater_than.map(Comparator::Above),
        condition.greater_than_or_equal_to.map(Comparator::AtLeast),
        condition.less_than.map(Comparator::Below),
        condition.less_than_or_equal_to.map(Comparator::AtMost),
    ]
    .into_iter()
    .flatten();

    let first = present.next()?;
    present.next().is_none().then_some(first)
}

pub fn lookup<'a>(snapshot: &'a Value, path: &str) -> Option<&'a Value> {
    if let Some(direct) = snapshot.as_object().and_then(|map| map.get(path)) {
        return Some(direct);
    }

    let mut current = snapshot;
    for segment in path.split(['.', '[', ']']).filter(|part| !part.is_empty()) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

pub fn parse_minutes(text: &str) -> Option<u32> {
    let cleaned = text.trim().replace('：', ":");
    let captures = CLOCK_TIME
        .captures(&cleaned)
        .or_else(|| HANZI_TIME.captures(&cleaned));
    let Some(captures) = captures else {
        warn!("unparsable time string {text:?}");
        return None;
    };

    let hours: u8 = captures[1].parse().ok()?;
    let minutes: u8 = captures[2].parse().ok()?;
    let time = time::Time::from_hms(hours, minutes, 0).ok()?;
    Some(u32::from(time.hour()) * 60 + u32::from(time.minute()))
}

pub fn time_in_range(range: &str, sample: &str) -> bool {
    let Some((start, end)) = range.split_once('-') else {
        return false;
    };
    let (Some(sample), Some(start), Some(end)) =
        (parse_minutes(sample), parse_minutes(start), parse_minutes(end))
    else {
        return false;
    };

    if start <= end {
        sample >= start && sample <= end
    } else {
        sample >= start || sample <= end
    }
}

fn values_equal(expected: &ExpectedValue, actual: &Value) -> bool {
    match (expected, actual) {
        (ExpectedValue::Text(expected), Value::String(actual)) => expected == actual,
        (ExpectedValue::Bool(expected), Value::Bool(actual)) => expected == actual,
        (ExpectedValue::Number(expected), Value::Number(actual)) => {
            actual.as_f64() == Some(*expected)
        }
        _ => false,
    }
}

pub fn condition_holds(condition: &Condition, snapshot: &Value) -> bool {
    let Some(comparator) = comparator(condition) else {
        return false;
    };
    let Some(sample) = lookup(snapshot, &condition.variable_path) else {
        return false;
    };

    match comparator {
        Comparator::Contains(needle) => sample.as_str().is_some_and(|text| text.contains(needle)),
        Comparator::TimeRange(range) => sample
            .as_str()
            .is_some_and(|text| time_in_range(range, text)),
        Comparator::Equals(expected) => values_equal(expected, sample),
        Comparator::Above(bound) => sample.as_f64().is_some_and(|value| value > bound),
        Comparator::AtLeast(bound) => sample.as_f64().is_some_and(|value| value >= bound),
        Comparator::Below(bound) => sample.as_f64().is_some_and(|value| value < bound),
        Comparator::AtMost(bound) => sample.as_f64().is_some_and(|value| value <= bound),
    }
}

pub fn evaluate(trigger: &Trigger, snapshot: Option<&Value>) -> bool {
    let Some(snapshot) = snapshot.filter(|value| !value.is_null()) else {
        return false;
    };
    !trigger.conditions.is_empty()
        && trigger
            .conditions
            .iter()
            .all(|condition| condition_holds(condition, snapshot))
}

pub fn diff(previous: Option<&Value>, current: Option<&Value>, triggers: &[Trigger]) -> EdgeReport {
    let mut report = EdgeReport::default();
    for trigger in triggers {
        let was_met = evaluate(trigger, previous);
        let is_met = evaluate(trigger, current);
        match (was_met, is_met) {
            (false, true) => {
                debug!("trigger for {:?} became active", trigger.playlist_id);
                report.newly_active.push(trigger.clone());
            }
            (true, false) => {
                debug!("trigger for {:?} became inactive", trigger.playlist_id);
                report.newly_inactive.push(trigger.clone());
            }
            _ => {}
        }
    }
    report
}

pub fn canonical_condition(condition: &Condition) -> String {
    let mut parts = vec![format!("variable_path:{}", condition.variable_path)];
    if let Some(value) = &condition.value {
        parts.push(format!("value:{value}"));
    }
    if let Some(needle) = &condition.value_contains {
        parts.push(format!("value_contains:{needle}"));
    }
    if let Some(bound) = condition.greater_than {
        parts.push(format!("greater_than:{bound}"));
    }
    if let Some(bound) = condition.greater_than_or_equal_to {
        parts.push(format!("greater_than_or_equal_to:{bound}"));
    }
    if let Some(bound) = condition.less_than {
        parts.push(format!("less_than:{bound}"));
    }
    if let Some(bound) = condition.less_than_or_equal_to {
        parts.push(format!("less_than_or_equal_to:{bound}"));
    }
    if let Some(range) = &condition.time_in_range {
        parts.push(format!("time_in_range:{range}"));
    }
    parts.sort();
    parts.join(",")
}

fn canonical_conditions(trigger: &Trigger) -> Vec<String> {
    let mut keys: Vec<String> = trigger.conditions.iter().map(canonical_condition).collect();
    keys.sort();
    keys
}

pub fn functionally_equal(a: &Trigger, b: &Trigger) -> bool {
    a.playlist_id == b.playlist_id && canonical_conditions(a) == canonical_conditions(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn mood_trigger(mood: &str) -> Trigger {
        Trigger::new(
            mood,
            1.0,
            vec![Condition::new("mood").equals(ExpectedValue::Text(mood.to_string()))],
        )
    }

    #[test]
    fn missing_snapshot_never_satisfies() {
        let trigger = mood_trigger("happy");
        assert!(!evaluate(&trigger, None));
        assert!(!evaluate(&trigger, Some(&Value::Null)));
    }

    #[test]
    fn wraparound_time_range() {
        let trigger = Trigger::new(
            "night",
            0.0,
            vec![Condition::new("world.clock").within("22:00-06:00")],
        );
        assert!(evaluate(&trigger, Some(&json!({"world": {"clock": "23:30"}}))));
        assert!(evaluate(&trigger, Some(&json!({"world": {"clock": "05:59"}}))));
        assert!(!evaluate(&trigger, Some(&json!({"world": {"clock": "12:00"}}))));
    }

    #[test]
    fn plain_time_range_is_inclusive() {
        assert!(time_in_range("08:00-12:00", "08:00"));
        assert!(time_in_range("08:00-12:00", "12:00"));
        assert!(!time_in_range("08:00-12:00", "12:01"));
    }

    #[test]
    fn time_parser_accepts_variants() {
        assert_eq!(parse_minutes("14:30"), Some(870));
        assert_eq!(parse_minutes(" 8 : 05 "), Some(485));
        assert_eq!(parse_minutes("22：00"), Some(1320));
        assert_eq!(parse_minutes("8时5分"), Some(485));
        assert_eq!(parse_minutes("8时5"), Some(485));
        assert_eq!(parse_minutes("24:00"), None);
        assert_eq!(parse_minutes("noon"), None);
    }

    #[test]
    fn unparsable_sample_fails_closed() {
        let trigger = Trigger::new("t", 0.0, vec![Condition::new("clock").within("22:00-06:00")]);
        assert!(!evaluate(&trigger, Some(&json!({"clock": "late"}))));
        assert!(!evaluate(&trigger, Some(&json!({"clock": 2330}))));
    }

    #[test]
    fn typed_comparators_reject_other_types() {
        let above = Trigger::new("t", 0.0, vec![Condition::new("hp").greater_than(10.0)]);
        assert!(evaluate(&above, Some(&json!({"hp": 11}))));
        assert!(!evaluate(&above, Some(&json!({"hp": "11"}))));
        assert!(!evaluate(&above, Some(&json!({"hp": 10}))));

        let contains = Trigger::new("t", 0.0, vec![Condition::new("place").contains("forest")]);
        assert!(evaluate(&contains, Some(&json!({"place": "dark forest"}))));
        assert!(!evaluate(&contains, Some(&json!({"place": ["forest"]}))));
    }

    #[test]
    fn numeric_bounds() {
        let snapshot = json!({"hp": 10});
        let check = |condition: Condition| {
            evaluate(&Trigger::new("t", 0.0, vec![condition]), Some(&snapshot))
        };
        assert!(check(Condition::new("hp").at_least(10.0)));
        assert!(check(Condition::new("hp").at_most(10.0)));
        assert!(!check(Condition::new("hp").less_than(10.0)));
        assert!(check(Condition::new("hp").less_than(10.5)));
    }

    #[test]
    fn equality_compares_numbers_numerically() {
        let trigger = Trigger::new(
            "t",
            0.0,
            vec![Condition::new("stage").equals(ExpectedValue::Number(2.0))],
        );
        assert!(evaluate(&trigger, Some(&json!({"stage": 2}))));
        assert!(evaluate(&trigger, Some(&json!({"stage": 2.0}))));
        assert!(!evaluate(&trigger, Some(&json!({"stage": "2"}))));
    }

    #[test]
    fn conditions_are_and_combined() {
        let trigger = Trigger::new(
            "t",
            0.0,
            vec![
                Condition::new("mood").equals(ExpectedValue::Text("calm".into())),
                Condition::new("hp").greater_than(5.0),
            ],
        );
        assert!(evaluate(&trigger, Some(&json!({"mood": "calm", "hp": 6}))));
        assert!(!evaluate(&trigger, Some(&json!({"mood": "calm", "hp": 4}))));
    }

    #[test]
    fn empty_or_ambiguous_conditions_never_hold() {
        let snapshot = json!({"hp": 10});
        let empty = Trigger::new("t", 0.0, vec![Condition::new("hp")]);
        assert!(!evaluate(&empty, Some(&snapshot)));

        let ambiguous = Trigger::new(
            "t",
            0.0,
            vec![Condition::new("hp").greater_than(1.0).less_than(20.0)],
        );
        assert!(!evaluate(&ambiguous, Some(&snapshot)));

        let no_conditions = Trigger::new("t", 0.0, Vec::new());
        assert!(!evaluate(&no_conditions, Some(&snapshot)));
    }

    #[test]
    fn lookup_prefers_literal_keys_and_walks_arrays() {
        let snapshot = json!({
            "virtual.music_tag": "forest",
            "party": {"members": [{"name": "ash"}, {"name": "wren"}]}
        });
        assert_eq!(lookup(&snapshot, "virtual.music_tag"), Some(&json!("forest")));
        assert_eq!(lookup(&snapshot, "party.members[1].name"), Some(&json!("wren")));
        assert_eq!(lookup(&snapshot, "party.members.0.name"), Some(&json!("ash")));
        assert_eq!(lookup(&snapshot, "party.leader"), None);
    }

    #[test]
    fn mood_shift_reports_one_activation() {
        let happy = mood_trigger("happy");
        let report = diff(
            Some(&json!({"mood": "sad"})),
            Some(&json!({"mood": "happy"})),
            std::slice::from_ref(&happy),
        );
        assert_eq!(report.newly_active, vec![happy]);
        assert!(report.newly_inactive.is_empty());
    }

    #[test]
    fn functional_equality_ignores_condition_order() {
        let a = Trigger::new(
            "battle",
            3.0,
            vec![
                Condition::new("hp").less_than(10.0),
                Condition::new("mode").equals(ExpectedValue::Text("fight".into())),
            ],
        );
        let mut b = a.clone();
        b.conditions.reverse();
        b.priority = 9.0;
        assert!(functionally_equal(&a, &b));

        let mut c = a.clone();
        c.playlist_id = "boss".into();
        assert!(!functionally_equal(&a, &c));

        let mut d = a.clone();
        d.conditions[0] = Condition::new("hp").less_than(11.0);
        assert!(!functionally_equal(&a, &d));
    }

    #[test]
    fn canonical_condition_is_sorted_key_value() {
        let condition = Condition::new("hp").at_least(5.0);
        assert_eq!(
            canonical_condition(&condition),
            "greater_than_or_equal_to:5,variable_path:hp"
        );
    }

    fn arb_snapshot() -> impl Strategy<Value = Value> {
        (0i64..6, prop::sample::select(vec!["calm", "tense", "happy"])).prop_map(|(hp, mood)| {
            serde_json::json!({"hp": hp, "mood": mood})
        })
    }

    fn fixture_triggers() -> Vec<Trigger> {
        vec![
            Trigger::new("low", 1.0, vec![Condition::new("hp").less_than(3.0)]),
            Trigger::new("high", 2.0, vec![Condition::new("hp").at_least(4.0)]),
            mood_trigger("calm"),
            Trigger::new(
                "tense_low",
                5.0,
                vec![
                    Condition::new("mood").equals(ExpectedValue::Text("tense".into())),
                    Condition::new("hp").at_most(2.0),
                ],
            ),
        ]
    }

    proptest! {
        #[test]
        fn diff_reports_exactly_the_flipped_triggers(prev in arb_snapshot(), cur in arb_snapshot()) {
            let triggers = fixture_triggers();
            let report = diff(Some(&prev), Some(&cur), &triggers);
            for trigger in &triggers {
                let was = evaluate(trigger, Some(&prev));
                let is = evaluate(trigger, Some(&cur));
                prop_assert_eq!(report.newly_active.contains(trigger), !was && is);
                prop_assert_eq!(report.newly_inactive.contains(trigger), was && !is);
            }
        }

        #[test]
        fn diff_of_identical_snapshots_is_empty(snapshot in arb_snapshot()) {
            let report = diff(Some(&snapshot), Some(&snapshot), &fixture_triggers());
            prop_assert!(report.is_empty());
        }
    }
}
