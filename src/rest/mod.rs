//! Request half: quota buckets, the bucket registry and the dispatcher.

pub mod bucket;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod headers;
pub mod registry;
pub mod route;
pub mod transport;

pub use bucket::{Admission, QuotaBucket};
pub use config::{DEFAULT_API_BASE, RestConfig};
pub use dispatcher::RequestDispatcher;
pub use error::{RestError, RestResult};
pub use headers::{QuotaHeaders, QuotaScope, QuotaSnapshot, QuotaViolation};
pub use registry::{BucketRegistry, BucketState};
pub use route::Route;
pub use transport::{HttpFuture, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
