use crate::areas::refs::RefValue;
use crate::areas::repository::Repository;

impl Repository {
    /// Print the target of a symbolic reference, or set it when `target` is given
    pub fn symbolic_ref(&self, name: &str, target: Option<&str>) -> anyhow::Result<()> {
        if let Some(target) = target {
            return self.refs().set_symbolic_ref(name, target);
        }

        match self.refs().read_raw(name)? {
            Some(RefValue::Symbolic(target)) => {
                writeln!(self.writer(), "{target}")?;
                Ok(())
            }
            _ => anyhow::bail!("ref {name} is not a symbolic ref"),
        }
    }
}
