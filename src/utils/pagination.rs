use crate::dtos::PaginationDto;

pub const HOME_PAGE_SIZE: i64 = 6;
pub const MY_BLOGS_PAGE_SIZE: i64 = 10;
pub const AUTHORS_PAGE_SIZE: i64 = 12;

/// Resolved page of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl Page {
    /// Lenient page lookup: a missing or non-numeric page is the first page,
    /// a number outside `1..=total_pages` is the last page. There is always at
    /// least one page, even for an empty listing.
    pub fn resolve(requested: Option<&str>, total: i64, per_page: i64) -> Page {
        let total = total.max(0);
        let total_pages = ((total + per_page - 1) / per_page).max(1);

        let number = match requested.map(str::trim).map(str::parse::<i64>) {
            None | Some(Err(_)) => 1,
            Some(Ok(n)) if n < 1 || n > total_pages => total_pages,
            Some(Ok(n)) => n,
        };

        Page {
            number,
            per_page,
            total,
            total_pages,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.number - 1) * self.per_page
    }

    pub fn to_dto(&self) -> PaginationDto {
        PaginationDto {
            page: self.number,
            limit: self.per_page,
            total: self.total,
            total_pages: self.total_pages,
            has_previous: self.number > 1,
            has_next: self.number < self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_garbage_page_is_first() {
        assert_eq!(Page::resolve(None, 20, 6).number, 1);
        assert_eq!(Page::resolve(Some("abc"), 20, 6).number, 1);
        assert_eq!(Page::resolve(Some(""), 20, 6).number, 1);
    }

    #[test]
    fn out_of_range_is_last_page() {
        let page = Page::resolve(Some("99"), 20, 6);
        assert_eq!(page.total_pages, 4);
        assert_eq!(page.number, 4);
        assert_eq!(page.offset(), 18);
        assert_eq!(Page::resolve(Some("0"), 20, 6).number, 4);
    }

    #[test]
    fn empty_listing_has_one_page() {
        let page = Page::resolve(Some("3"), 0, 6);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.number, 1);
        assert_eq!(page.offset(), 0);
        let dto = page.to_dto();
        assert!(!dto.has_next);
        assert!(!dto.has_previous);
    }

    #[test]
    fn exact_multiple_does_not_add_a_page() {
        let page = Page::resolve(Some("2"), 12, 6);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.number, 2);
        assert!(page.to_dto().has_previous);
    }
}
