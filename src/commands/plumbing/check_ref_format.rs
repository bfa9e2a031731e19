use crate::areas::repository::Repository;

impl Repository {
    /// Whether `name` is acceptable as a reference name
    pub fn check_ref_format(&self, name: &str) -> bool {
        self.refs().validator().is_valid(name)
    }
}
