//! User Conditions & Time Restrictions
//!
//! Structured predicates a voucher may carry on top of its eligibility rules:
//! nested boolean tag rules over the customer's tags, a minimum order history,
//! and a weekday/hour window evaluated in a fixed offset.

use jiff::{
    Timestamp,
    civil::Weekday,
    tz::{Offset, TimeZone},
};
use rustc_hash::FxHashSet;
use smallvec::{SmallVec, smallvec};

use crate::voucher::DefinitionError;

/// Boolean operation used to combine tag rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    /// All child rules must match.
    And,

    /// At least one child rule must match.
    Or,
}

/// Tag qualification over a customer's tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagQualification {
    /// How `rules` are combined.
    pub op: BoolOp,

    /// Child rules. Empty means "match every customer".
    pub rules: SmallVec<[TagRule; 2]>,
}

/// Single tag rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagRule {
    /// Customer must have all listed tags.
    HasAll {
        /// Tag set used by this rule.
        tags: FxHashSet<String>,
    },

    /// Customer must have at least one listed tag.
    HasAny {
        /// Tag set used by this rule.
        tags: FxHashSet<String>,
    },

    /// Customer must have none of the listed tags.
    HasNone {
        /// Tag set used by this rule.
        tags: FxHashSet<String>,
    },

    /// Nested qualification group.
    Group(Box<TagQualification>),
}

impl TagQualification {
    /// Create a qualification from operator and rules.
    #[must_use]
    pub fn new(op: BoolOp, rules: SmallVec<[TagRule; 2]>) -> Self {
        Self { op, rules }
    }

    /// Require any of the given tags.
    #[must_use]
    pub fn any_of<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            op: BoolOp::And,
            rules: smallvec![TagRule::HasAny {
                tags: tags.into_iter().map(Into::into).collect()
            }],
        }
    }

    /// Evaluate the qualification against a customer's tags.
    #[must_use]
    pub fn matches(&self, customer_tags: &FxHashSet<String>) -> bool {
        if self.rules.is_empty() {
            return true;
        }

        match self.op {
            BoolOp::And => self.rules.iter().all(|rule| rule.matches(customer_tags)),
            BoolOp::Or => self.rules.iter().any(|rule| rule.matches(customer_tags)),
        }
    }
}

impl TagRule {
    fn matches(&self, customer_tags: &FxHashSet<String>) -> bool {
        match self {
            Self::HasAll { tags } => tags.is_subset(customer_tags),
            Self::HasAny { tags } => !tags.is_disjoint(customer_tags),
            Self::HasNone { tags } => tags.is_disjoint(customer_tags),
            Self::Group(group) => group.matches(customer_tags),
        }
    }
}

/// Conditions on the requesting customer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserConditions {
    /// Minimum number of completed orders before this voucher applies.
    pub min_prior_orders: Option<u64>,

    /// Tag membership the customer must satisfy.
    pub tags: Option<TagQualification>,
}

impl UserConditions {
    /// Whether a customer with this history and these tags qualifies.
    #[must_use]
    pub fn matches(&self, prior_completed_orders: u64, customer_tags: &FxHashSet<String>) -> bool {
        let history_ok = self
            .min_prior_orders
            .is_none_or(|min| prior_completed_orders >= min);

        let tags_ok = self
            .tags
            .as_ref()
            .is_none_or(|qualification| qualification.matches(customer_tags));

        history_ok && tags_ok
    }
}

/// Hours of the day a voucher applies, `start` inclusive and `end` exclusive.
///
/// A window with `start > end` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourWindow {
    /// First hour, 0-23.
    pub start: i8,
    /// Hour the window closes, 0-23.
    pub end: i8,
}

impl HourWindow {
    fn contains(self, hour: i8) -> bool {
        if self.start <= self.end {
            (self.start..self.end).contains(&hour)
        } else {
            hour >= self.start || hour < self.end
        }
    }
}

/// Day-of-week and hour window, evaluated at a fixed UTC offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRestrictions {
    /// Allowed weekdays. Empty means every day.
    pub weekdays: SmallVec<[Weekday; 7]>,

    /// Allowed hours. `None` means all day.
    pub hours: Option<HourWindow>,

    /// Offset the window is expressed in.
    pub offset: Offset,
}

impl TimeRestrictions {
    /// Check hours are within 0-23 and the window is not empty.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if let Some(HourWindow { start, end }) = self.hours {
            let in_range = (0..24).contains(&start) && (0..24).contains(&end);

            if !in_range || start == end {
                return Err(DefinitionError::InvalidHourWindow { start, end });
            }
        }

        Ok(())
    }

    /// Whether `now` falls inside the restriction.
    #[must_use]
    pub fn allows(&self, now: Timestamp) -> bool {
        let local = now.to_zoned(TimeZone::fixed(self.offset));

        let day_ok = self.weekdays.is_empty() || self.weekdays.contains(&local.weekday());
        let hour_ok = self.hours.is_none_or(|window| window.contains(local.hour()));

        day_ok && hour_ok
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    fn tags(names: &[&str]) -> FxHashSet<String> {
        names.iter().map(|name| (*name).to_string()).collect()
    }

    #[test]
    fn empty_qualification_matches_everyone() {
        let qualification = TagQualification::new(BoolOp::And, SmallVec::new());

        assert!(qualification.matches(&tags(&[])));
    }

    #[test]
    fn supports_nested_boolean_groups() {
        let qualification = TagQualification::new(
            BoolOp::And,
            smallvec![
                TagRule::HasAll {
                    tags: tags(&["verified"])
                },
                TagRule::Group(Box::new(TagQualification::new(
                    BoolOp::Or,
                    smallvec![
                        TagRule::HasAny {
                            tags: tags(&["gold", "platinum"])
                        },
                        TagRule::HasNone {
                            tags: tags(&["flagged"])
                        }
                    ]
                )))
            ],
        );

        assert!(qualification.matches(&tags(&["verified", "gold", "flagged"])));
        assert!(qualification.matches(&tags(&["verified"])));
        assert!(!qualification.matches(&tags(&["gold"])));
        assert!(!qualification.matches(&tags(&["verified", "flagged"])));
    }

    #[test]
    fn user_conditions_require_order_history_and_tags() {
        let conditions = UserConditions {
            min_prior_orders: Some(3),
            tags: Some(TagQualification::any_of(["student"])),
        };

        assert!(conditions.matches(3, &tags(&["student"])));
        assert!(!conditions.matches(2, &tags(&["student"])));
        assert!(!conditions.matches(5, &tags(&["staff"])));
    }

    #[test]
    fn hour_window_wraps_midnight() {
        let late = HourWindow { start: 22, end: 2 };

        assert!(late.contains(23));
        assert!(late.contains(1));
        assert!(!late.contains(2));
        assert!(!late.contains(12));
    }

    #[test]
    fn restrictions_are_evaluated_in_their_offset() -> TestResult {
        let restrictions = TimeRestrictions {
            weekdays: smallvec![Weekday::Monday],
            hours: Some(HourWindow { start: 9, end: 12 }),
            offset: Offset::from_hours(7)?,
        };

        // 2026-03-02 is a Monday: 03:00Z is 10:00 at +07.
        assert!(restrictions.allows("2026-03-02T03:00:00Z".parse()?));
        // 06:00Z is 13:00 at +07, outside the window.
        assert!(!restrictions.allows("2026-03-02T06:00:00Z".parse()?));
        // Sunday 20:00Z is already Monday 03:00 at +07, too early.
        assert!(!restrictions.allows("2026-03-01T20:00:00Z".parse()?));

        Ok(())
    }

    #[test]
    fn validate_rejects_empty_and_out_of_range_windows() -> TestResult {
        let mut restrictions = TimeRestrictions {
            weekdays: SmallVec::new(),
            hours: Some(HourWindow { start: 5, end: 5 }),
            offset: Offset::UTC,
        };

        assert!(restrictions.validate().is_err());

        restrictions.hours = Some(HourWindow { start: 0, end: 24 });

        assert!(restrictions.validate().is_err());

        restrictions.hours = Some(HourWindow { start: 0, end: 23 });
        restrictions.validate()?;

        Ok(())
    }
}
