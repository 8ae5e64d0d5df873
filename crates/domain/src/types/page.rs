//! Paginated collection envelope returned by list endpoints

use serde::{Deserialize, Serialize};

/// One page of a server-side collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub total_elements: u64,
    pub total_pages: u32,
    /// Requested page size
    pub size: u32,
    /// Zero-based page index
    pub number: u32,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.number.saturating_add(1) >= self.total_pages
    }

    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            content: self.content.into_iter().map(f).collect(),
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            size: self.size,
            number: self.number,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_page_deserializes_camel_case() {
        let page: Page<String> = serde_json::from_value(json!({
            "content": ["Ana", "Luis"],
            "totalElements": 12,
            "totalPages": 6,
            "size": 2,
            "number": 5
        }))
        .expect("valid page");

        assert_eq!(page.content, vec!["Ana".to_string(), "Luis".to_string()]);
        assert_eq!(page.total_elements, 12);
        assert!(page.is_last());
        assert_eq!(page.map(|name| name.len()).content, vec![3, 4]);
    }

    #[test]
    fn test_empty_collection_is_last_page() {
        let page: Page<u8> = Page { content: vec![], total_elements: 0, total_pages: 0, size: 20, number: 0 };
        assert!(page.is_last());
    }
}
