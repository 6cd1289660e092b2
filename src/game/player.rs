use crate::types::Role;

#[derive(Debug, Clone)]
pub struct Player {
    pub id: String,
    pub display_name: String,
    pub role: Role,
    pub is_alive: bool,
    pub is_human: bool,
    /// Last bounded speech line from the discussion phase.
    #[allow(dead_code)]
    pub last_dialogue: String,
}

impl Player {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            role,
            is_alive: true,
            is_human: false,
            last_dialogue: String::new(),
        }
    }

    pub fn reset_for_new_game(&mut self) {
        self.is_alive = true;
        self.last_dialogue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::Player;
    use crate::types::Role;

    #[test]
    fn reset_revives_without_touching_identity() {
        let mut p = Player::new("player_0", "Alex", Role::Mafia);
        p.is_alive = false;
        p.last_dialogue = "I trust Blair.".to_string();
        p.reset_for_new_game();
        assert!(p.is_alive);
        assert!(p.last_dialogue.is_empty());
        assert_eq!(p.role, Role::Mafia);
        assert_eq!(p.display_name, "Alex");
    }
}
