use std::sync::{OnceLock, RwLock};

static SPECIES: OnceLock<RwLock<Vec<String>>> = OnceLock::new();

fn table() -> &'static RwLock<Vec<String>> {
    SPECIES.get_or_init(|| RwLock::new(Vec::new()))
}

/// Interns a species name and returns its process-wide integer id.
///
/// The table is write-rare: simulations register all species during
/// configuration and only read afterwards. Repeated calls with the same name
/// return the same id.
pub fn species_id(name: &str) -> u32 {
    {
        let list = table().read().unwrap();
        if let Some(pos) = list.iter().position(|s| s == name) {
            return pos as u32;
        }
    }
    let mut list = table().write().unwrap();
    // Re-check: another thread may have interned it between the locks.
    if let Some(pos) = list.iter().position(|s| s == name) {
        return pos as u32;
    }
    list.push(name.to_string());
    (list.len() - 1) as u32
}

/// Looks a species id up without interning; `None` for unknown names.
pub fn find_species(name: &str) -> Option<u32> {
    let list = table().read().unwrap();
    list.iter().position(|s| s == name).map(|p| p as u32)
}

/// The symbolic name of a species id.
pub fn species_name(id: u32) -> Option<String> {
    let list = table().read().unwrap();
    list.get(id as usize).cloned()
}

/// Number of interned species.
pub fn species_count() -> usize {
    table().read().unwrap().len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let a = species_id("test-species-a");
        let b = species_id("test-species-b");
        assert_ne!(a, b);
        assert_eq!(a, species_id("test-species-a"));
        assert_eq!(species_name(a).unwrap(), "test-species-a");
        assert_eq!(find_species("test-species-b"), Some(b));
        assert!(species_count() >= 2);
    }
}
