use crate::Iso9660Error;
use core::str::Split;

/// Components of an absolute path, in order from the root.
#[derive(Debug, Clone)]
pub struct Components<'p> {
    inner: Split<'p, char>,
    depth: usize,
}

impl Components<'_> {
    /// Number of components; always at least one.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }
}

impl<'p> Iterator for Components<'p> {
    type Item = &'p str;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// Split `/a/b/c` into `a`, `b`, `c`.
///
/// # Errors
/// [`Iso9660Error::InvalidArgument`] unless the path starts with `/` and
/// every component is non-empty.
pub fn parse_path(path: &str) -> Result<Components<'_>, Iso9660Error> {
    let Some(rest) = path.strip_prefix('/') else {
        return Err(Iso9660Error::InvalidArgument);
    };

    if rest.split('/').any(str::is_empty) {
        return Err(Iso9660Error::InvalidArgument);
    }

    Ok(Components {
        inner: rest.split('/'),
        depth: rest.split('/').count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_absolute_paths() {
        let c = parse_path("/AmberOS/System/amberkrn.elf").unwrap();
        assert_eq!(c.depth(), 3);
        assert_eq!(
            c.collect::<Vec<_>>(),
            ["AmberOS", "System", "amberkrn.elf"]
        );
    }

    #[test]
    fn single_component() {
        let c = parse_path("/BOOT.CFG").unwrap();
        assert_eq!(c.depth(), 1);
    }

    #[test]
    fn rejects_relative_and_empty_components() {
        for bad in ["", "/", "boot/boot.cfg", "//boot", "/boot/", "/boot//x"] {
            assert_eq!(
                parse_path(bad).unwrap_err(),
                Iso9660Error::InvalidArgument,
                "{bad:?}"
            );
        }
    }
}
