//! Endpoint grammar for the module protocol.
//!
//! Module paths contain slashes and versions are free-form tokens, which
//! axum's path templates cannot express. The table below is an ordered list
//! of anchored patterns; `{path}` is greedy so the version is whatever
//! follows the last `/@v/`.

use axum::http::Method;
use regex::Regex;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Latest,
    Info,
    ModFile,
    Archive,
    Upload,
}

/// A request path resolved to an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub operation: Operation,
    pub module: String,
    pub version: Option<String>,
}

#[derive(Debug)]
struct Endpoint {
    pattern: Regex,
    operation: Operation,
    upload: bool,
}

impl Endpoint {
    fn accepts(&self, method: &Method) -> bool {
        if self.upload {
            method == Method::POST
        } else {
            method == Method::GET || method == Method::HEAD
        }
    }

    fn allow(&self) -> &'static str {
        if self.upload { "POST" } else { "GET, HEAD" }
    }
}

#[derive(Debug)]
pub struct Routes {
    endpoints: Vec<Endpoint>,
}

impl Routes {
    /// Build the table. `upload_prefix` is `None` when uploads are disabled.
    pub fn new(read_prefix: &str, upload_prefix: Option<&str>) -> Result<Self, regex::Error> {
        let read = regex::escape(read_prefix);
        let mut table = vec![
            (format!(r"^{read}/(.+)/@v/list$"), Operation::List, false),
            (format!(r"^{read}/(.+)/@latest$"), Operation::Latest, false),
            (format!(r"^{read}/(.+)/@v/(.+)\.info$"), Operation::Info, false),
            (format!(r"^{read}/(.+)/@v/(.+)\.mod$"), Operation::ModFile, false),
            (format!(r"^{read}/(.+)/@v/(.+)\.zip$"), Operation::Archive, false),
        ];
        if let Some(prefix) = upload_prefix {
            let upload = regex::escape(prefix);
            table.push((format!(r"^{upload}/(.+)/@v/(.+)\.zip$"), Operation::Upload, true));
        }

        let endpoints = table
            .into_iter()
            .map(|(pattern, operation, upload)| {
                Ok(Endpoint {
                    pattern: Regex::new(&pattern)?,
                    operation,
                    upload,
                })
            })
            .collect::<Result<_, regex::Error>>()?;
        Ok(Self { endpoints })
    }

    /// Resolve a request to an operation.
    ///
    /// The first endpoint matching both path and method wins. A path that
    /// only matches under another method is `405`; anything else is `404`.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<Route, ApiError> {
        let mut wrong_method = None;
        for endpoint in &self.endpoints {
            let Some(caps) = endpoint.pattern.captures(path) else {
                continue;
            };
            if !endpoint.accepts(method) {
                wrong_method.get_or_insert(endpoint.allow());
                continue;
            }
            return Ok(Route {
                operation: endpoint.operation,
                module: caps[1].to_owned(),
                version: caps.get(2).map(|m| m.as_str().to_owned()),
            });
        }
        match wrong_method {
            Some(allow) => Err(ApiError::MethodNotAllowed { allow }),
            None => Err(ApiError::NotFound(format!("no endpoint for {path}"))),
        }
    }
}
