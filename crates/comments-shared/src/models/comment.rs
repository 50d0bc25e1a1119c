use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored comment. `text` and the author fields are always the sanitized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub user_name: String,
    pub email: String,
    pub home_page: Option<String>,
    pub text: String,
    pub parent_comment_id: Option<i64>,
    pub date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
}

impl Comment {
    pub fn is_top_level(&self) -> bool {
        self.parent_comment_id.is_none()
    }
}

/// A comment together with every descendant, grouped by parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub children: Vec<CommentNode>,
}

impl CommentNode {
    pub fn leaf(comment: Comment) -> Self {
        Self {
            comment,
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> i64 {
        self.comment.id
    }

    /// Number of comments in this subtree, the root included.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(CommentNode::len).sum::<usize>()
    }

    pub fn find(&self, id: i64) -> Option<&CommentNode> {
        if self.id() == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid sort parameter: {0}")]
pub struct InvalidSortParameter(pub String);

/// Columns top-level comments may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    UserName,
    Email,
    #[default]
    Date,
}

impl SortField {
    /// Name as it appears in query strings.
    pub fn as_str(self) -> &'static str {
        match self {
            SortField::UserName => "userName",
            SortField::Email => "email",
            SortField::Date => "date",
        }
    }

    /// Database column backing this field.
    pub fn column(self) -> &'static str {
        match self {
            SortField::UserName => "user_name",
            SortField::Email => "email",
            SortField::Date => "date",
        }
    }
}

impl FromStr for SortField {
    type Err = InvalidSortParameter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "userName" => Ok(SortField::UserName),
            "email" => Ok(SortField::Email),
            "date" => Ok(SortField::Date),
            other => Err(InvalidSortParameter(format!("sortBy={other}"))),
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = InvalidSortParameter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(InvalidSortParameter(format!("sortOrder={other}"))),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn comment(id: i64, parent: Option<i64>) -> Comment {
        Comment {
            id,
            user_name: format!("user{id}"),
            email: format!("user{id}@example.com"),
            home_page: None,
            text: "hello".to_string(),
            parent_comment_id: parent,
            date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            attachment: None,
        }
    }

    #[test]
    fn sort_params_accept_only_known_names() {
        assert_eq!("userName".parse::<SortField>(), Ok(SortField::UserName));
        assert_eq!("date".parse::<SortField>(), Ok(SortField::Date));
        assert!("text".parse::<SortField>().is_err());
        assert!("user_name".parse::<SortField>().is_err());
        assert!("DATE".parse::<SortField>().is_err());

        assert_eq!("asc".parse::<SortOrder>(), Ok(SortOrder::Asc));
        assert!("ASC".parse::<SortOrder>().is_err());
        assert!("sideways".parse::<SortOrder>().is_err());
    }

    #[test]
    fn node_serializes_flat_with_children() {
        let mut root = CommentNode::leaf(comment(1, None));
        root.children.push(CommentNode::leaf(comment(2, Some(1))));

        let value = serde_json::to_value(&root).unwrap();
        assert_eq!(value["id"], 1);
        assert_eq!(value["userName"], "user1");
        assert!(value["parentCommentId"].is_null());
        assert_eq!(value["children"][0]["parentCommentId"], 1);
        assert_eq!(value["children"][0]["children"], serde_json::json!([]));
        assert!(value.get("attachment").is_none());
    }

    #[test]
    fn node_lookup_walks_descendants() {
        let mut root = CommentNode::leaf(comment(1, None));
        let mut child = CommentNode::leaf(comment(2, Some(1)));
        child.children.push(CommentNode::leaf(comment(3, Some(2))));
        root.children.push(child);

        assert_eq!(root.len(), 3);
        assert_eq!(root.find(3).map(CommentNode::id), Some(3));
        assert!(root.find(4).is_none());
    }
}
