#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkillType {
    Fist,
    Club,
    Sword,
    Axe,
    Distance,
    Shielding,
    Fishing,
}

/// Order the skills arrive in on the wire.
pub const SKILL_ORDER: [SkillType; 7] = [
    SkillType::Fist,
    SkillType::Club,
    SkillType::Sword,
    SkillType::Axe,
    SkillType::Distance,
    SkillType::Shielding,
    SkillType::Fishing,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkillLevel {
    pub level: u8,
    pub percent: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkillSet {
    levels: [SkillLevel; 7],
}

impl SkillSet {
    pub fn from_wire(levels: [SkillLevel; 7]) -> Self {
        Self { levels }
    }

    pub fn get(&self, skill: SkillType) -> SkillLevel {
        let index = SKILL_ORDER
            .iter()
            .position(|entry| *entry == skill)
            .unwrap_or(0);
        self.levels[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_follows_wire_order() {
        let mut levels = [SkillLevel::default(); 7];
        levels[4] = SkillLevel { level: 55, percent: 12 };
        let skills = SkillSet::from_wire(levels);
        assert_eq!(skills.get(SkillType::Distance), SkillLevel { level: 55, percent: 12 });
        assert_eq!(skills.get(SkillType::Fist), SkillLevel::default());
    }
}
