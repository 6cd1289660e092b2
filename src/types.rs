#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Mafia,
    Doctor,
    Detective,
    Villager,
    Jester,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mafia => "Mafia",
            Self::Doctor => "Doctor",
            Self::Detective => "Detective",
            Self::Villager => "Villager",
            Self::Jester => "Jester",
        }
    }

    /// Roles that act at night.
    pub fn has_night_action(self) -> bool {
        matches!(self, Self::Mafia | Self::Doctor | Self::Detective)
    }

    /// Legal night verbs for this role, most aggressive first.
    pub fn night_verbs(self) -> &'static [&'static str] {
        match self {
            Self::Mafia => &["Kill", "DoNothing"],
            Self::Doctor => &["Save", "DoNothing"],
            Self::Detective => &["Investigate", "DoNothing"],
            Self::Villager | Self::Jester => &["DoNothing"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Night,
    Discussion,
    Voting,
    Results,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Night => "Night",
            Self::Discussion => "Discussion",
            Self::Voting => "Voting",
            Self::Results => "Results",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Town,
    Mafia,
    Jester,
    /// Sentinel for games halted by a fatal pipeline error.
    Aborted,
}

impl Winner {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Town => "Town",
            Self::Mafia => "Mafia",
            Self::Jester => "Jester",
            Self::Aborted => "Aborted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EliminationCause {
    Night,
    Vote,
}

impl EliminationCause {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Night => "Night",
            Self::Vote => "Vote",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEventKind {
    GameStart,
    Decision,
    Suspicion,
    PhaseAdvance,
    Elimination,
    Winner,
    Abort,
    Save,
}

impl AuditEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GameStart => "game_start",
            Self::Decision => "decision",
            Self::Suspicion => "suspicion",
            Self::PhaseAdvance => "phase",
            Self::Elimination => "elimination",
            Self::Winner => "winner",
            Self::Abort => "abort",
            Self::Save => "save",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Phase, Role, Winner};

    #[test]
    fn night_verbs_match_roles() {
        assert_eq!(Role::Mafia.night_verbs(), &["Kill", "DoNothing"]);
        assert_eq!(Role::Doctor.night_verbs(), &["Save", "DoNothing"]);
        assert_eq!(Role::Detective.night_verbs(), &["Investigate", "DoNothing"]);
        assert_eq!(Role::Villager.night_verbs(), &["DoNothing"]);
    }

    #[test]
    fn only_power_roles_act_at_night() {
        assert!(Role::Mafia.has_night_action());
        assert!(Role::Doctor.has_night_action());
        assert!(Role::Detective.has_night_action());
        assert!(!Role::Villager.has_night_action());
        assert!(!Role::Jester.has_night_action());
    }

    #[test]
    fn string_forms_are_stable() {
        assert_eq!(Phase::Night.as_str(), "Night");
        assert_eq!(Phase::Results.as_str(), "Results");
        assert_eq!(Winner::Aborted.as_str(), "Aborted");
        assert_eq!(Role::Jester.as_str(), "Jester");
    }
}
