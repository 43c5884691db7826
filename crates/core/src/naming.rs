//! Permanent artifact naming.

use crate::policy::SanitizedName;
use uuid::Uuid;

/// Generate a collision-resistant permanent name:
/// `{stem}-{random token}.{extension}`.
///
/// The token is a random UUID rather than a timestamp, so concurrent uploads
/// of the same name within one clock tick still get distinct names.
pub fn permanent_name(name: &SanitizedName) -> String {
    let token = Uuid::new_v4().simple();
    if name.extension.is_empty() {
        format!("{}-{}", name.stem, token)
    } else {
        format!("{}-{}.{}", name.stem, token, name.extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::sanitize_name;

    #[test]
    fn test_permanent_name_shape() {
        let name = sanitize_name("../../etc/passwd.png", 100);
        let permanent = permanent_name(&name);
        assert!(permanent.starts_with("passwd-"));
        assert!(permanent.ends_with(".png"));
        assert!(!permanent.contains('/'));
        // stem + '-' + 32 hex chars + ".png"
        assert_eq!(permanent.len(), "passwd".len() + 1 + 32 + 4);
    }

    #[test]
    fn test_permanent_names_are_unique() {
        let name = sanitize_name("photo.png", 100);
        let names: std::collections::HashSet<_> =
            (0..1000).map(|_| permanent_name(&name)).collect();
        assert_eq!(names.len(), 1000);
    }
}
