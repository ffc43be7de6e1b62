//! Settings port - 設定値の取得元（環境変数、アプリ設定など）

/// Read-only key/value settings.
pub trait Settings: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Look up `key`, falling back to the platform spelling with `_` in place of
/// `.` (some environments cannot carry dots in variable names).
pub fn lookup(settings: &dyn Settings, key: &str) -> Option<String> {
    settings.get(key).or_else(|| {
        let fallback = key.replace('.', "_");
        if fallback == key {
            None
        } else {
            settings.get(&fallback)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::MapSettings;

    #[test]
    fn dotted_key_wins_over_underscore_spelling() {
        let settings = MapSettings::from_pairs([("A.B.Disabled", "1"), ("A_B_Disabled", "0")]);
        assert_eq!(lookup(&settings, "A.B.Disabled").as_deref(), Some("1"));
    }

    #[test]
    fn falls_back_to_underscore_spelling() {
        let settings = MapSettings::from_pairs([("A_B_Disabled", "true")]);
        assert_eq!(lookup(&settings, "A.B.Disabled").as_deref(), Some("true"));
        assert_eq!(lookup(&settings, "A.C.Disabled"), None);
    }
}
