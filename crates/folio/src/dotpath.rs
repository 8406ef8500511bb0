/// A dotted address such as `markdown.posts.hello.md`, split into its first
/// segment and the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DotPath<'a> {
    head: &'a str,
    rest: Option<&'a str>,
}

impl<'a> DotPath<'a> {
    pub fn parse(path: &'a str) -> Self {
        match path.split_once('.') {
            Some((head, rest)) if !rest.is_empty() => Self {
                head,
                rest: Some(rest),
            },
            Some((head, _)) => Self { head, rest: None },
            None => Self {
                head: path,
                rest: None,
            },
        }
    }

    pub fn head(&self) -> &'a str {
        self.head
    }

    pub fn rest(&self) -> Option<&'a str> {
        self.rest
    }

    pub fn is_leaf(&self) -> bool {
        self.rest.is_none()
    }

    /// Moves one segment deeper, or `None` at the leaf.
    pub fn descend(&self) -> Option<DotPath<'a>> {
        self.rest.map(DotPath::parse)
    }
}

/// Turns a relative filesystem path into dotted form (`posts/a.md` → `posts.a.md`).
pub fn dotted(relative: &str) -> String {
    relative
        .replace('\\', "/")
        .trim_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_first_segment() {
        let path = DotPath::parse("markdown.posts.hello.md");
        assert_eq!(path.head(), "markdown");
        assert_eq!(path.rest(), Some("posts.hello.md"));
    }

    #[test]
    fn test_parse_single_segment_is_leaf() {
        let path = DotPath::parse("global");
        assert_eq!(path.head(), "global");
        assert!(path.is_leaf());
    }

    #[test]
    fn test_trailing_dot_is_leaf() {
        let path = DotPath::parse("collection.");
        assert_eq!(path.head(), "collection");
        assert!(path.is_leaf());
    }

    #[test]
    fn test_descend_walks_segments() {
        let path = DotPath::parse("a.b.c");
        let next = path.descend().unwrap();
        assert_eq!(next.head(), "b");
        let last = next.descend().unwrap();
        assert_eq!(last.head(), "c");
        assert!(last.descend().is_none());
    }

    #[test]
    fn test_dotted_replaces_separators() {
        assert_eq!(dotted("posts/2024/hello.md"), "posts.2024.hello.md");
        assert_eq!(dotted("/posts/"), "posts");
        assert_eq!(dotted(""), "");
    }
}
