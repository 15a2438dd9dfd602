use serde::{Deserialize, Serialize};
use super::TrainTypeId;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DwellError {
    #[error("no minimum dwell rule without filters is defined")]
    NoDefaultRule,
    #[error("track {0} given without a location")]
    TrackWithoutLocation(u32),
}

/// Minimum dwell in seconds, applying to every stop its non-null filters match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinimumDwellRule {
    pub dwell: u32,
    #[serde(default)]
    pub train_type: Option<TrainTypeId>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub track: Option<u32>,
}

impl MinimumDwellRule {
    #[must_use]
    pub fn new(dwell: u32, train_type: Option<TrainTypeId>, location: Option<&str>, track: Option<u32>) -> Self {
        Self {
            dwell,
            train_type,
            location: location.map(ToString::to_string),
            track,
        }
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        self.train_type.is_none() && self.location.is_none() && self.track.is_none()
    }
}

/// How well one filter (or conjunction of filters) of a rule fits a lookup.
/// A null filter ranks between a match and a contradiction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchScore {
    Contradicts,
    Wildcard,
    Exact,
}

impl From<Option<bool>> for MatchScore {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Self::Exact,
            None => Self::Wildcard,
            Some(false) => Self::Contradicts,
        }
    }
}

/// Ranking key of a rule for one lookup, compared field by field, most
/// specific first. `track` is only populated when the lookup has a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RuleRank {
    pub track: Option<MatchScore>,
    pub location: MatchScore,
    pub train_type: MatchScore,
}

/// Null-aware equality: unknown if the rule side is null. A rule filter never
/// matches a lookup value that is absent.
fn equals<T: PartialEq + ?Sized>(rule: Option<&T>, wanted: Option<&T>) -> Option<bool> {
    let rule = rule?;
    Some(wanted.is_some_and(|wanted| rule == wanted))
}

/// Null-aware conjunction: false wins over null, null wins over true
fn and(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

/// The full set of minimum dwell rules, read once per projection pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DwellRules {
    rules: Vec<MinimumDwellRule>,
}

impl DwellRules {
    #[must_use]
    pub fn new(rules: Vec<MinimumDwellRule>) -> Self {
        Self { rules }
    }

    #[must_use]
    pub fn rules(&self) -> &[MinimumDwellRule] {
        &self.rules
    }

    pub fn push(&mut self, rule: MinimumDwellRule) {
        self.rules.push(rule);
    }

    /// Check the rule set can answer every lookup
    ///
    /// # Errors
    ///
    /// Returns `DwellError::NoDefaultRule` if the unfiltered rule is missing.
    pub fn validate(&self) -> Result<(), DwellError> {
        if self.rules.iter().any(MinimumDwellRule::is_default) {
            Ok(())
        } else {
            Err(DwellError::NoDefaultRule)
        }
    }

    #[must_use]
    pub fn rank(
        rule: &MinimumDwellRule,
        train_type: Option<TrainTypeId>,
        location: Option<&str>,
        track: Option<u32>,
    ) -> RuleRank {
        let location_matches = equals(rule.location.as_deref(), location);

        let track_rank = track.map(|_| {
            and(location_matches, equals(rule.track.as_ref(), track.as_ref())).into()
        });

        RuleRank {
            track: track_rank,
            location: and(location_matches, Some(rule.track.is_none())).into(),
            train_type: equals(rule.train_type.as_ref(), train_type.as_ref()).into(),
        }
    }

    /// Minimum dwell in seconds for a train of `train_type` at `location` on
    /// `track`. The most specific matching rule wins.
    ///
    /// # Errors
    ///
    /// Returns `DwellError::NoDefaultRule` if the unfiltered fallback rule is
    /// missing and `DwellError::TrackWithoutLocation` if a track is given
    /// without a location.
    pub fn resolve(
        &self,
        train_type: Option<TrainTypeId>,
        location: Option<&str>,
        track: Option<u32>,
    ) -> Result<u32, DwellError> {
        if let (Some(track), None) = (track, location) {
            return Err(DwellError::TrackWithoutLocation(track));
        }
        self.validate()?;

        self.rules
            .iter()
            .max_by_key(|rule| Self::rank(rule, train_type, location, track))
            .map(|rule| rule.dwell)
            .ok_or(DwellError::NoDefaultRule)
    }
}

impl FromIterator<MinimumDwellRule> for DwellRules {
    fn from_iter<I: IntoIterator<Item = MinimumDwellRule>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IC: TrainTypeId = 1;
    const RE: TrainTypeId = 2;

    fn layered_rules() -> DwellRules {
        DwellRules::new(vec![
            MinimumDwellRule::new(45, None, None, None),
            MinimumDwellRule::new(200, Some(IC), None, None),
            MinimumDwellRule::new(100, None, Some("XPN"), None),
            MinimumDwellRule::new(101, None, Some("XPN"), Some(1)),
            MinimumDwellRule::new(103, None, Some("XPN"), Some(3)),
            MinimumDwellRule::new(203, Some(IC), Some("XPN"), Some(3)),
        ])
    }

    fn resolve(rules: &DwellRules, train_type: TrainTypeId, location: Option<&str>, track: Option<u32>) -> u32 {
        rules.resolve(Some(train_type), location, track).expect("default rule exists")
    }

    #[test]
    fn test_type_rule_without_location() {
        let rules = layered_rules();
        assert_eq!(resolve(&rules, IC, None, None), 200);
        assert_eq!(resolve(&rules, RE, None, None), 45);
    }

    #[test]
    fn test_location_rule_beats_type_rule() {
        let rules = layered_rules();
        assert_eq!(resolve(&rules, IC, Some("XPN"), None), 100);
        assert_eq!(resolve(&rules, RE, Some("XPN"), None), 100);
    }

    #[test]
    fn test_unknown_track_falls_back_to_location_rule() {
        let rules = layered_rules();
        assert_eq!(resolve(&rules, IC, Some("XPN"), Some(2)), 100);
        assert_eq!(resolve(&rules, RE, Some("XPN"), Some(2)), 100);
    }

    #[test]
    fn test_track_rule_with_type_tie_break() {
        let rules = layered_rules();
        assert_eq!(resolve(&rules, IC, Some("XPN"), Some(3)), 203);
        assert_eq!(resolve(&rules, RE, Some("XPN"), Some(3)), 103);
    }

    #[test]
    fn test_other_location_uses_type_or_global_rule() {
        let rules = layered_rules();
        assert_eq!(resolve(&rules, IC, Some("XDE"), None), 200);
        assert_eq!(resolve(&rules, IC, Some("XDE"), Some(1)), 200);
        assert_eq!(resolve(&rules, RE, Some("XDE"), None), 45);
        assert_eq!(resolve(&rules, RE, Some("XDE"), Some(1)), 45);
    }

    #[test]
    fn test_specificity_order() {
        let rules = DwellRules::new(vec![
            MinimumDwellRule::new(10, None, None, None),
            MinimumDwellRule::new(20, Some(RE), None, None),
            MinimumDwellRule::new(30, None, Some("XBG"), None),
            MinimumDwellRule::new(40, None, Some("XBG"), Some(2)),
        ]);
        assert_eq!(resolve(&rules, RE, Some("XBG"), Some(2)), 40);
        assert_eq!(resolve(&rules, RE, Some("XBG"), Some(1)), 30);
        assert_eq!(resolve(&rules, RE, Some("XLG"), Some(1)), 20);
        assert_eq!(resolve(&rules, IC, Some("XLG"), Some(1)), 10);
    }

    #[test]
    fn test_train_without_type_uses_untyped_rule() {
        let rules = layered_rules();
        assert_eq!(rules.resolve(None, Some("XDE"), None), Ok(45));
    }

    #[test]
    fn test_missing_default_rule() {
        let rules = DwellRules::new(vec![MinimumDwellRule::new(200, Some(IC), None, None)]);
        assert_eq!(rules.resolve(Some(IC), Some("XDE"), None), Err(DwellError::NoDefaultRule));
        assert_eq!(rules.validate(), Err(DwellError::NoDefaultRule));
        assert_eq!(DwellRules::default().resolve(None, None, None), Err(DwellError::NoDefaultRule));
    }

    #[test]
    fn test_track_without_location_is_rejected() {
        let rules = layered_rules();
        assert_eq!(rules.resolve(Some(IC), None, Some(1)), Err(DwellError::TrackWithoutLocation(1)));
    }

    #[test]
    fn test_rank_uses_null_aware_conjunction() {
        let rule = MinimumDwellRule::new(1, None, None, Some(3));
        let rank = DwellRules::rank(&rule, Some(IC), Some("XPN"), Some(4));
        assert_eq!(rank.track, Some(MatchScore::Contradicts));
        assert_eq!(rank.location, MatchScore::Contradicts);
        assert_eq!(rank.train_type, MatchScore::Wildcard);

        let rule = MinimumDwellRule::new(1, Some(IC), Some("XPN"), None);
        let rank = DwellRules::rank(&rule, Some(IC), Some("XPN"), None);
        assert_eq!(rank.track, None);
        assert_eq!(rank.location, MatchScore::Exact);
        assert_eq!(rank.train_type, MatchScore::Exact);
    }
}
