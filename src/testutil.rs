use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::fetch::{FetchedPage, PageFetcher};

enum Scripted {
    Page { body: String, lastmod: Option<String> },
    Terminal(u16),
    Transient,
}

/// Fetcher double: serves canned bodies by URL and records every request.
/// Unknown URLs answer 404 so a wandering test fails loudly.
pub struct ScriptedFetcher {
    pages: HashMap<String, Scripted>,
    log: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> ScriptedFetcher {
        ScriptedFetcher {
            pages: HashMap::new(),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn page(self, url: &str, body: &str) -> ScriptedFetcher {
        self.page_with_lastmod(url, body, None)
    }

    pub fn page_with_lastmod(
        mut self,
        url: &str,
        body: &str,
        lastmod: Option<&str>,
    ) -> ScriptedFetcher {
        self.pages.insert(
            url.to_string(),
            Scripted::Page {
                body: body.to_string(),
                lastmod: lastmod.map(|v| v.to_string()),
            },
        );
        self
    }

    pub fn terminal(mut self, url: &str, status: u16) -> ScriptedFetcher {
        self.pages.insert(url.to_string(), Scripted::Terminal(status));
        self
    }

    pub fn transient(mut self, url: &str) -> ScriptedFetcher {
        self.pages.insert(url.to_string(), Scripted::Transient);
        self
    }

    pub fn fixture(self, url: &str, name: &str) -> ScriptedFetcher {
        let body = std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap();
        self.page(url, &body)
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn total_fetches(&self) -> usize {
        self.log.lock().unwrap().len()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.log.lock().unwrap().push(url.to_string());
        match self.pages.get(url) {
            Some(Scripted::Page { body, lastmod }) => Ok(FetchedPage {
                final_url: url.to_string(),
                status: 200,
                lastmod: lastmod.clone(),
                body: body.clone(),
            }),
            Some(Scripted::Terminal(status)) => Err(FetchError::Terminal {
                url: url.to_string(),
                status: *status,
            }),
            Some(Scripted::Transient) => Err(FetchError::Transient {
                url: url.to_string(),
                reason: "connection reset".to_string(),
            }),
            None => Err(FetchError::Terminal {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}
