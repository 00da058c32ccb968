//! Small declarative helpers shared by the HTTP crates.

/// Generate a `routes` function that registers every listed handler on an
/// actix-web `ServiceConfig`.
///
/// ```ignore
/// macros_utils::routes! {
///     route health_route,
/// }
/// ```
#[cfg(feature = "actix")]
#[macro_export]
macro_rules! routes {
    ($(route $handler:ident),* $(,)?) => {
        pub fn routes(cfg: &mut ::actix_web::web::ServiceConfig) {
            $( cfg.service($handler); )*
        }
    };
}
