//! Migration Locator - The fixed set of migrations known to the process
//!
//! The locator sorts its migrations once at construction and refuses duplicate
//! versions, so every query afterwards is a slice of an ascending sequence.

use crate::error::{MigrationError, MigrationResult};
use crate::migration::Migration;
use crate::version::Version;

/// Read-only registry answering ordering queries over known migrations
pub struct MigrationLocator<T: Send> {
    migrations: Vec<Box<dyn Migration<T>>>,
}

impl<T: Send> MigrationLocator<T> {
    /// Build a locator from the registered migrations
    ///
    /// Fails with [`MigrationError::DuplicateVersion`] when two migrations
    /// share a version.
    pub fn new(mut migrations: Vec<Box<dyn Migration<T>>>) -> MigrationResult<Self> {
        migrations.sort_by_key(|m| m.version());

        if let Some(pair) = migrations
            .windows(2)
            .find(|pair| pair[0].version() == pair[1].version())
        {
            return Err(MigrationError::DuplicateVersion {
                version: pair[0].version(),
                first: pair[0].description().to_string(),
                second: pair[1].description().to_string(),
            });
        }

        Ok(Self { migrations })
    }

    /// A locator with nothing registered
    pub fn empty() -> Self {
        Self {
            migrations: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// All migrations, ascending by version
    pub fn migrations(&self) -> &[Box<dyn Migration<T>>] {
        &self.migrations
    }

    /// Highest registered version
    pub fn latest_version(&self) -> MigrationResult<Version> {
        self.migrations
            .last()
            .map(|m| m.version())
            .ok_or(MigrationError::NoMigrationsFound)
    }

    /// Migrations with a version strictly greater than `version`, ascending
    ///
    /// `None` means nothing has been applied yet and yields every migration.
    pub fn migrations_after(&self, version: Option<&Version>) -> &[Box<dyn Migration<T>>] {
        match version {
            None => &self.migrations,
            Some(version) => {
                let start = self.migrations.partition_point(|m| m.version() <= *version);
                &self.migrations[start..]
            }
        }
    }

    /// The migration registered under exactly `version`
    pub fn find(&self, version: &Version) -> Option<&dyn Migration<T>> {
        self.migrations
            .binary_search_by_key(version, |m| m.version())
            .ok()
            .map(|index| self.migrations[index].as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use proptest::prelude::*;

    struct Noop {
        version: Version,
        description: String,
    }

    #[async_trait]
    impl Migration<()> for Noop {
        fn version(&self) -> Version {
            self.version
        }

        fn description(&self) -> &str {
            &self.description
        }

        async fn execute(&self, _target: &mut ()) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn noop(major: u32, description: &str) -> Box<dyn Migration<()>> {
        Box::new(Noop {
            version: Version::from(major),
            description: description.to_string(),
        })
    }

    fn versions(migrations: &[Box<dyn Migration<()>>]) -> Vec<u32> {
        migrations.iter().map(|m| m.version().major()).collect()
    }

    #[test]
    fn test_migrations_are_sorted_on_construction() {
        let locator = MigrationLocator::new(vec![
            noop(3, "drop legacy column"),
            noop(1, "add index"),
            noop(2, "backfill field"),
        ])
        .unwrap();

        assert_eq!(locator.len(), 3);
        assert_eq!(versions(locator.migrations()), vec![1, 2, 3]);
        assert_eq!(locator.latest_version().unwrap(), Version::from(3));
    }

    #[test]
    fn test_migrations_after() {
        let locator =
            MigrationLocator::new(vec![noop(5, "e"), noop(1, "a"), noop(3, "c")]).unwrap();

        assert_eq!(versions(locator.migrations_after(None)), vec![1, 3, 5]);
        assert_eq!(
            versions(locator.migrations_after(Some(&Version::from(1)))),
            vec![3, 5]
        );
        // A version between two registered ones
        assert_eq!(
            versions(locator.migrations_after(Some(&Version::new(3, 0, 1)))),
            vec![5]
        );
        assert!(locator.migrations_after(Some(&Version::from(5))).is_empty());
        assert!(locator.migrations_after(Some(&Version::from(9))).is_empty());
    }

    #[test]
    fn test_empty_locator_has_no_latest_version() {
        let locator = MigrationLocator::<()>::empty();
        assert!(locator.is_empty());
        assert!(matches!(
            locator.latest_version(),
            Err(MigrationError::NoMigrationsFound)
        ));
        assert!(locator.migrations_after(None).is_empty());
    }

    #[test]
    fn test_duplicate_versions_are_rejected() {
        let err = MigrationLocator::new(vec![
            noop(1, "add index"),
            noop(2, "backfill field"),
            noop(1, "add other index"),
        ])
        .err()
        .expect("duplicates must fail");

        match err {
            MigrationError::DuplicateVersion {
                version,
                first,
                second,
            } => {
                assert_eq!(version, Version::from(1));
                let mut names = vec![first, second];
                names.sort();
                assert_eq!(names, vec!["add index", "add other index"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_find() {
        let locator = MigrationLocator::new(vec![noop(2, "b"), noop(4, "d")]).unwrap();
        assert_eq!(locator.find(&Version::from(4)).unwrap().description(), "d");
        assert!(locator.find(&Version::from(3)).is_none());
    }

    proptest! {
        #[test]
        fn test_migrations_after_is_ascending_and_exact(
            registered in proptest::collection::btree_set(0u32..200, 0..40),
            pivot in proptest::option::of(0u32..220)
        ) {
            let migrations = registered.iter().rev().map(|v| noop(*v, "step")).collect();
            let locator = MigrationLocator::new(migrations).unwrap();

            let pivot_version = pivot.map(Version::from);
            let after = versions(locator.migrations_after(pivot_version.as_ref()));

            let expected: Vec<u32> = registered
                .iter()
                .copied()
                .filter(|v| pivot.map_or(true, |p| *v > p))
                .collect();
            prop_assert_eq!(&after, &expected);
            prop_assert!(after.windows(2).all(|w| w[0] < w[1]));

            match registered.iter().max() {
                Some(max) => prop_assert_eq!(locator.latest_version().unwrap(), Version::from(*max)),
                None => prop_assert!(locator.latest_version().is_err()),
            }
        }
    }
}
