use std::fmt;

/// Catalog table an identifier resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Key,
    Value,
    Questiongroup,
    Category,
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CatalogKind::Key => "key",
            CatalogKind::Value => "value",
            CatalogKind::Questiongroup => "questiongroup",
            CatalogKind::Category => "category",
        };
        f.write_str(name)
    }
}

/// Node kinds of the configuration tree, derived from depth.
///
/// Dispatch over node kinds goes through the tables below instead of
/// inspecting the runtime shape of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Section,
    Category,
    Subcategory,
    Questiongroup,
    Question,
}

/// Field name of the root-level children list.
pub const ROOT_CHILDREN: &str = "sections";

/// Options allowed on the document root.
pub const ROOT_OPTIONS: &[&str] = &[ROOT_CHILDREN];

/// Synthetic ordering field stored on records of numbered questiongroups.
pub const ORDER_FIELD: &str = "__order";

impl NodeKind {
    /// Plural name of this node kind as it appears in the document.
    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Section => "sections",
            NodeKind::Category => "categories",
            NodeKind::Subcategory => "subcategories",
            NodeKind::Questiongroup => "questiongroups",
            NodeKind::Question => "questions",
        }
    }

    /// Children list fields, outermost first. Subcategories may nest
    /// further subcategories next to questiongroups.
    pub fn children_fields(self) -> &'static [(&'static str, NodeKind)] {
        match self {
            NodeKind::Section => &[("categories", NodeKind::Category)],
            NodeKind::Category => &[("subcategories", NodeKind::Subcategory)],
            NodeKind::Subcategory => &[
                ("subcategories", NodeKind::Subcategory),
                ("questiongroups", NodeKind::Questiongroup),
            ],
            NodeKind::Questiongroup => &[("questions", NodeKind::Question)],
            NodeKind::Question => &[],
        }
    }

    /// Whitelisted option keys for a node of this kind.
    pub fn valid_options(self) -> &'static [&'static str] {
        match self {
            NodeKind::Section => &["keyword", "categories", "view_options"],
            NodeKind::Category => &["keyword", "subcategories", "view_options", "form_options"],
            NodeKind::Subcategory => &[
                "keyword",
                "subcategories",
                "questiongroups",
                "view_options",
                "form_options",
            ],
            NodeKind::Questiongroup => &["keyword", "questions", "view_options", "form_options"],
            NodeKind::Question => &["keyword", "view_options", "form_options", "summary"],
        }
    }

    /// Catalog table a keyword of this kind resolves against.
    pub fn catalog_kind(self) -> CatalogKind {
        match self {
            NodeKind::Section | NodeKind::Category | NodeKind::Subcategory => CatalogKind::Category,
            NodeKind::Questiongroup => CatalogKind::Questiongroup,
            NodeKind::Question => CatalogKind::Key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_fields_follow_tree_depth() {
        assert_eq!(
            NodeKind::Section.children_fields(),
            &[("categories", NodeKind::Category)]
        );
        assert_eq!(NodeKind::Question.children_fields(), &[]);
        let subcat = NodeKind::Subcategory.children_fields();
        assert_eq!(subcat.len(), 2);
    }

    #[test]
    fn question_keywords_resolve_against_keys() {
        assert_eq!(NodeKind::Question.catalog_kind(), CatalogKind::Key);
        assert_eq!(NodeKind::Subcategory.catalog_kind(), CatalogKind::Category);
    }
}
