use uuid::Uuid;

/// Entity kinds that receive generated identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPrefix {
    User,
    Home,
    Device,
    Template,
    Reading,
    Rule,
    Alert,
}

impl IdPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdPrefix::User => "user",
            IdPrefix::Home => "home",
            IdPrefix::Device => "dev",
            IdPrefix::Template => "tpl",
            IdPrefix::Reading => "rdg",
            IdPrefix::Rule => "rule",
            IdPrefix::Alert => "alert",
        }
    }
}

/// IdGenerator trait for abstracting identifier generation
pub trait IdGenerator: Send + Sync {
    /// Generate a new UUID v4 in hyphenated lowercase format
    fn uuid_v4(&self) -> String;

    /// Generate an identifier such as `dev_<uuid>`
    fn prefixed(&self, prefix: IdPrefix) -> String {
        format!("{}_{}", prefix.as_str(), self.uuid_v4())
    }
}

/// Production implementation of IdGenerator using random UUID generation
#[derive(Debug, Clone, Default)]
pub struct RandomIdGenerator;

impl RandomIdGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl IdGenerator for RandomIdGenerator {
    fn uuid_v4(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Test implementation returning a fixed sequence, wrapping when exhausted
#[derive(Debug, Clone)]
pub struct FixedIdGenerator {
    uuids: Vec<String>,
    index: std::sync::Arc<std::sync::Mutex<usize>>,
}

impl FixedIdGenerator {
    pub fn new(uuids: Vec<String>) -> Self {
        Self {
            uuids,
            index: std::sync::Arc::new(std::sync::Mutex::new(0)),
        }
    }

    pub fn single(uuid: &str) -> Self {
        Self::new(vec![uuid.to_string()])
    }

    pub fn from_strings(uuid_strs: &[&str]) -> Self {
        Self::new(uuid_strs.iter().map(|s| s.to_string()).collect())
    }

    fn next_index(&self) -> usize {
        let mut index = match self.index.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let current = *index;
        *index += 1;
        current
    }
}

impl IdGenerator for FixedIdGenerator {
    fn uuid_v4(&self) -> String {
        if self.uuids.is_empty() {
            return Uuid::nil().to_string();
        }
        let i = self.next_index();
        self.uuids[i % self.uuids.len()].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_id_generator_v4() {
        let generator = RandomIdGenerator::new();
        let a = generator.uuid_v4();
        let b = generator.uuid_v4();

        assert_ne!(a, b);
        assert_eq!(Uuid::parse_str(&a).unwrap().get_version_num(), 4);
    }

    #[test]
    fn test_prefixed_ids() {
        let generator = FixedIdGenerator::single("550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(
            generator.prefixed(IdPrefix::Device),
            "dev_550e8400-e29b-41d4-a716-446655440000"
        );
        assert!(generator.prefixed(IdPrefix::Home).starts_with("home_"));
        assert!(generator.prefixed(IdPrefix::Template).starts_with("tpl_"));
        assert!(generator.prefixed(IdPrefix::Reading).starts_with("rdg_"));
        assert!(generator.prefixed(IdPrefix::Rule).starts_with("rule_"));
        assert!(generator.prefixed(IdPrefix::Alert).starts_with("alert_"));
        assert!(generator.prefixed(IdPrefix::User).starts_with("user_"));
    }

    #[test]
    fn test_fixed_id_generator_sequence_wraps() {
        let generator = FixedIdGenerator::from_strings(&["a", "b"]);
        assert_eq!(generator.uuid_v4(), "a");
        assert_eq!(generator.uuid_v4(), "b");
        assert_eq!(generator.uuid_v4(), "a");
    }

    #[test]
    fn test_fixed_id_generator_clones_share_counter() {
        let generator = FixedIdGenerator::from_strings(&["a", "b", "c"]);
        let clone = generator.clone();
        assert_eq!(generator.uuid_v4(), "a");
        assert_eq!(clone.uuid_v4(), "b");
    }

    #[test]
    fn test_empty_fixed_generator_returns_nil() {
        let generator = FixedIdGenerator::new(Vec::new());
        assert_eq!(generator.uuid_v4(), Uuid::nil().to_string());
    }

    #[test]
    fn test_id_generator_trait_object() {
        let random_gen: Box<dyn IdGenerator> = Box::new(RandomIdGenerator::new());
        assert!(random_gen.prefixed(IdPrefix::Alert).starts_with("alert_"));
    }
}
