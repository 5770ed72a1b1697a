use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

pub const API_VERSION: &str = "0.1.0";

/// Outer shape shared by every JSON response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub api_version: &'static str,
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct ItemBody<T> {
    pub success: bool,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<T>,
}

#[derive(Debug, Serialize)]
pub struct ListBody<T> {
    pub success: bool,
    pub title: String,
    pub message: String,
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

pub type ApiItem<T> = Json<Envelope<ItemBody<T>>>;
pub type ApiList<T> = Json<Envelope<ListBody<T>>>;

pub fn item<T: Serialize>(title: &str, message: &str, item: T) -> ApiItem<T> {
    Json(Envelope {
        api_version: API_VERSION,
        data: ItemBody {
            success: true,
            title: title.to_string(),
            message: message.to_string(),
            item: Some(item),
        },
    })
}

pub fn created<T: Serialize>(title: &str, message: &str, value: T) -> (StatusCode, ApiItem<T>) {
    (StatusCode::CREATED, item(title, message, value))
}

/// Acknowledgement with no payload.
pub fn message(title: &str, message: &str) -> ApiItem<()> {
    Json(Envelope {
        api_version: API_VERSION,
        data: ItemBody {
            success: true,
            title: title.to_string(),
            message: message.to_string(),
            item: None,
        },
    })
}

pub fn list<T: Serialize>(
    title: &str,
    message: String,
    items: Vec<T>,
    pagination: Option<Pagination>,
) -> ApiList<T> {
    Json(Envelope {
        api_version: API_VERSION,
        data: ListBody {
            success: true,
            title: title.to_string(),
            message,
            items,
            pagination,
        },
    })
}

/// `?page=&per_page=` (also accepts `limit` and `perPage`).
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default, alias = "limit", alias = "perPage")]
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl PageQuery {
    pub fn resolve(self, default_per_page: u32, max_per_page: u32) -> Page {
        Page {
            page: self.page.filter(|p| *p >= 1).unwrap_or(1),
            per_page: self
                .per_page
                .filter(|n| *n >= 1)
                .unwrap_or(default_per_page)
                .min(max_per_page),
        }
    }
}

impl Page {
    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: i64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl Pagination {
    pub fn new(total: i64, page: Page) -> Self {
        let per_page = i64::from(page.per_page);
        let total_pages = (total + per_page - 1) / per_page;
        Self {
            total,
            page: page.page,
            per_page: page.per_page,
            total_pages,
            has_next_page: i64::from(page.page) < total_pages,
            has_prev_page: page.page > 1,
        }
    }
}
