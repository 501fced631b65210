use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paging {
    Within(Window),
    /// Requested page is past the end; `last` is the page to send them to.
    Beyond { last: usize },
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub page: usize,
    pub pages: usize,
    pub count: usize,
    pub limit: usize,
    #[serde(skip)]
    pub skip: usize,
}

pub fn resolve(page: usize, limit: usize, count: usize) -> Paging {
    let limit = limit.max(1);
    let mut page = page.max(1);
    let pages = count.div_ceil(limit).max(1);

    if page > pages {
        if count > 0 {
            return Paging::Beyond { last: pages };
        }
        // nothing to redirect to, so any page of an empty catalog is the first
        page = 1;
    }

    Paging::Within(Window {
        page,
        pages,
        count,
        limit,
        skip: (page - 1).saturating_mul(limit),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_page() {
        assert_eq!(
            resolve(1, 6, 14),
            Paging::Within(Window {
                page: 1,
                pages: 3,
                count: 14,
                limit: 6,
                skip: 0,
            })
        );
    }

    #[test]
    fn test_last_partial_page() {
        let Paging::Within(window) = resolve(3, 6, 14) else {
            panic!("expected page 3 to exist");
        };
        assert_eq!(window.skip, 12);
    }

    #[test]
    fn test_zero_page_is_first() {
        assert!(matches!(resolve(0, 6, 14), Paging::Within(Window { page: 1, .. })));
    }

    #[test]
    fn test_beyond_last_page() {
        assert_eq!(resolve(9, 6, 14), Paging::Beyond { last: 3 });
    }

    #[test]
    fn test_empty_collection_has_one_page() {
        assert_eq!(
            resolve(5, 6, 0),
            Paging::Within(Window {
                page: 1,
                pages: 1,
                count: 0,
                limit: 6,
                skip: 0,
            })
        );
    }

    #[test]
    fn test_huge_page_numbers_do_not_overflow() {
        assert!(matches!(
            resolve(usize::MAX, 6, 0),
            Paging::Within(Window { page: 1, skip: 0, .. })
        ));
        assert_eq!(resolve(usize::MAX, 6, 14), Paging::Beyond { last: 3 });
        assert_eq!(resolve(usize::MAX, usize::MAX, 1), Paging::Beyond { last: 1 });
    }
}
