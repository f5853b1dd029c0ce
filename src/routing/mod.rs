pub mod backend_resolver;
pub mod function_handler;
pub mod function_identity;
pub mod function_router;
pub mod function_selector;
pub mod retry_transport;
pub mod router_config;
pub mod router_error;
pub mod routing_table;
pub mod service_cache;
pub mod trigger;

#[cfg(test)]
mod test_function_handler;
#[cfg(test)]
pub(crate) mod test_support;
