use serde::{Deserialize, Deserializer};

/// Keeps "field absent" and "field set to null" apart for nullable columns.
///
/// Use together with `#[serde(default)]`: absent gives `None`, `null` gives
/// `Some(None)` and a value gives `Some(Some(value))`.
pub fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// `?include=session,author` style relation selection.
#[derive(Deserialize, Debug, Default)]
pub struct IncludeQuery {
    include: Option<String>,
}

impl IncludeQuery {
    pub fn wants(&self, relation: &str) -> bool {
        self.include.as_deref().map_or(false, |include| {
            include
                .split(',')
                .map(str::trim)
                .any(|name| name == relation || name == "all")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        bio: Option<Option<String>>,
    }

    #[test]
    fn double_option_distinguishes_null_from_absent() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        let null: Patch = serde_json::from_str(r#"{"bio": null}"#).unwrap();
        let set: Patch = serde_json::from_str(r#"{"bio": "hi"}"#).unwrap();

        assert_eq!(absent.bio, None);
        assert_eq!(null.bio, Some(None));
        assert_eq!(set.bio, Some(Some("hi".to_owned())));
    }

    #[test]
    fn include_matches_listed_relations() {
        let query = IncludeQuery {
            include: Some("session, author".into()),
        };
        assert!(query.wants("session"));
        assert!(query.wants("author"));
        assert!(!query.wants("speaker"));

        let all = IncludeQuery {
            include: Some("all".into()),
        };
        assert!(all.wants("speaker"));
        assert!(!IncludeQuery::default().wants("session"));
    }
}
