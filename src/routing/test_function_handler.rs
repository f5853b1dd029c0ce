#[cfg(test)]
mod tests {
    use crate::handlers::dispatch::handle_request;
    use crate::routing::function_identity::FunctionIdentity;
    use crate::routing::function_router::FunctionRouter;
    use crate::routing::function_selector::FunctionSelector;
    use crate::routing::retry_transport::RetryParams;
    use crate::routing::service_cache::FunctionServiceCache;
    use crate::routing::test_support::{unreachable_address, SequenceResolver};
    use crate::routing::trigger::{
        FunctionReference, MatchRule, PathMatch, TriggerDefinition, WeightedFunction,
    };
    use actix_web::http::{Method, StatusCode};
    use actix_web::web::Bytes;
    use actix_web::{test, web, App};
    use mockito::mock;
    use reqwest::Url;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_params() -> RetryParams {
        RetryParams {
            timeout: Duration::from_millis(50),
            timeout_exponent: 2.0,
            keep_alive: Duration::from_secs(30),
            max_retries: 10,
        }
    }

    fn trigger_for(path: &str, function: &FunctionIdentity) -> TriggerDefinition {
        TriggerDefinition {
            name: "xxx".to_string(),
            namespace: "default".to_string(),
            resource_version: "1234".to_string(),
            match_rule: MatchRule {
                host: None,
                path: PathMatch::Prefix(path.to_string()),
                methods: vec![],
            },
            function_reference: FunctionReference::SingleFunction {
                function: function.clone(),
            },
            retry: None,
        }
    }

    fn router_with(
        params: RetryParams,
        resolver: &Arc<SequenceResolver>,
        triggers: Vec<TriggerDefinition>,
    ) -> web::Data<FunctionRouter> {
        let cache = Arc::new(FunctionServiceCache::new(Duration::ZERO, 0));
        let router = FunctionRouter::new(params, cache, resolver.clone());
        router.update_triggers(triggers).unwrap();
        web::Data::new(router)
    }

    macro_rules! ingress {
        ($router:expr) => {
            test::init_service(
                App::new()
                    .app_data($router.clone())
                    .default_service(web::to(handle_request)),
            )
            .await
        };
    }

    /*
       1. Create a backend that answers "hi"
       2. Put it in the service cache
       3. Route a trigger to the function
       4. Send a request through the router, ensure it reaches the backend
    */
    #[actix_rt::test]
    async fn test_function_proxying() {
        let _mock = mock("GET", "/proxying").with_status(200).with_body("hi").create();
        let backend = Url::parse(&mockito::server_url()).unwrap();
        let function = FunctionIdentity::new("foo", "default");

        let resolver = Arc::new(SequenceResolver::new(vec![]));
        let router = router_with(test_params(), &resolver, vec![trigger_for("/proxying", &function)]);
        router.cache().assign(&function, backend.clone());
        let app = ingress!(router);

        let req = test::TestRequest::get().uri("/proxying").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, Bytes::from_static(b"hi"));

        assert_eq!(resolver.calls(), 0);
        assert_eq!(router.cache().lookup(&function), Some(backend));
    }

    #[actix_rt::test]
    async fn test_cache_miss_resolves_and_populates() {
        let _mock = mock("GET", "/miss").with_status(200).with_body("hi").create();
        let backend = Url::parse(&mockito::server_url()).unwrap();
        let function = FunctionIdentity::new("foo", "default");

        let resolver = Arc::new(SequenceResolver::new(vec![backend.clone()]));
        let router = router_with(test_params(), &resolver, vec![trigger_for("/miss", &function)]);
        let app = ingress!(router);

        let req = test::TestRequest::get().uri("/miss").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, Bytes::from_static(b"hi"));

        assert_eq!(resolver.calls(), 1);
        assert_eq!(router.cache().lookup(&function), Some(backend));

        // the backend was tapped in the background
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(resolver.taps(), 1);
    }

    #[actix_rt::test]
    async fn test_cold_start_recovery() {
        let _mock = mock("POST", "/cold-start")
            .match_body("ping")
            .with_status(200)
            .with_body("pong")
            .create();
        let backend = Url::parse(&mockito::server_url()).unwrap();
        let function = FunctionIdentity::new("foo", "default");

        // first answer points at a backend that is not up yet
        let resolver = Arc::new(SequenceResolver::new(vec![unreachable_address(), backend.clone()]));
        let router = router_with(test_params(), &resolver, vec![trigger_for("/cold-start", &function)]);
        let app = ingress!(router);

        let req = test::TestRequest::post()
            .uri("/cold-start")
            .set_payload("ping")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, Bytes::from_static(b"pong"));

        assert_eq!(resolver.calls(), 2);
        assert_eq!(router.cache().lookup(&function), Some(backend));
    }

    #[actix_rt::test]
    async fn test_retry_exhaustion() {
        let dead = unreachable_address();
        let function = FunctionIdentity::new("foo", "default");
        let params = RetryParams {
            max_retries: 3,
            ..test_params()
        };

        let resolver = Arc::new(SequenceResolver::new(vec![dead.clone()]));
        let router = router_with(params, &resolver, vec![trigger_for("/exhausted", &function)]);
        router.cache().assign(&function, dead);
        let app = ingress!(router);

        let req = test::TestRequest::get().uri("/exhausted").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            test::read_body(resp).await,
            Bytes::from_static(b"error: function unavailable")
        );

        assert_eq!(resolver.calls(), 3);
        assert!(router.cache().lookup(&function).is_none());
    }

    #[actix_rt::test]
    async fn test_resolution_failure() {
        let function = FunctionIdentity::new("foo", "default");
        let resolver = Arc::new(SequenceResolver::new(vec![]));
        let router = router_with(test_params(), &resolver, vec![trigger_for("/unresolvable", &function)]);
        let app = ingress!(router);

        let req = test::TestRequest::get().uri("/unresolvable").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        // no retries on resolution failure
        assert_eq!(resolver.calls(), 1);
        assert!(router.cache().is_empty());
    }

    #[actix_rt::test]
    async fn test_no_route() {
        let function = FunctionIdentity::new("foo", "default");
        let resolver = Arc::new(SequenceResolver::new(vec![]));
        let router = router_with(test_params(), &resolver, vec![trigger_for("/routed", &function)]);
        let app = ingress!(router);

        let req = test::TestRequest::get().uri("/elsewhere").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resolver.calls(), 0);
    }

    #[actix_rt::test]
    async fn test_backend_error_status_passes_through() {
        let _mock = mock("GET", "/app-error")
            .with_status(503)
            .with_header("x-backend", "yes")
            .with_body("busy")
            .create();
        let backend = Url::parse(&mockito::server_url()).unwrap();
        let function = FunctionIdentity::new("foo", "default");

        let resolver = Arc::new(SequenceResolver::new(vec![backend.clone()]));
        let router = router_with(test_params(), &resolver, vec![trigger_for("/app-error", &function)]);
        let app = ingress!(router);

        let req = test::TestRequest::get().uri("/app-error").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.headers().get("x-backend").unwrap(), "yes");
        assert_eq!(test::read_body(resp).await, Bytes::from_static(b"busy"));

        assert_eq!(resolver.calls(), 1);
        assert_eq!(router.cache().lookup(&function), Some(backend));
    }

    #[actix_rt::test]
    async fn test_head_keeps_declared_length() {
        let _mock = mock("HEAD", "/head")
            .with_status(200)
            .with_header("content-length", "5")
            .create();
        let backend = Url::parse(&mockito::server_url()).unwrap();
        let function = FunctionIdentity::new("foo", "default");

        let resolver = Arc::new(SequenceResolver::new(vec![backend]));
        let router = router_with(test_params(), &resolver, vec![trigger_for("/head", &function)]);
        let app = ingress!(router);

        let req = test::TestRequest::default()
            .method(Method::HEAD)
            .uri("/head")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("content-length").unwrap(), "5");
        assert!(test::read_body(resp).await.is_empty());
    }

    #[actix_rt::test]
    async fn test_per_trigger_retry_override() {
        let dead = unreachable_address();
        let function = FunctionIdentity::new("foo", "default");
        let mut trigger = trigger_for("/override", &function);
        trigger.retry = Some(crate::routing::trigger::RetryOverride {
            max_retries: Some(1),
            ..Default::default()
        });

        let resolver = Arc::new(SequenceResolver::new(vec![dead]));
        let router = router_with(test_params(), &resolver, vec![trigger]);
        let app = ingress!(router);

        let req = test::TestRequest::get().uri("/override").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        // initial resolution plus one re-resolution
        assert_eq!(resolver.calls(), 2);
    }

    struct LastMember;

    impl FunctionSelector for LastMember {
        fn select<'a>(&self, reference: &'a FunctionReference) -> Option<&'a FunctionIdentity> {
            match reference {
                FunctionReference::SingleFunction { function } => Some(function),
                FunctionReference::WeightedGroup { functions } => functions.last().map(|f| &f.function),
            }
        }
    }

    #[actix_rt::test]
    async fn test_weighted_group_uses_selector() {
        let _mock = mock("GET", "/canary").with_status(200).with_body("v2").create();
        let backend = Url::parse(&mockito::server_url()).unwrap();
        let v1 = FunctionIdentity::new("checkout-v1", "default");
        let v2 = FunctionIdentity::new("checkout-v2", "default");

        let mut trigger = trigger_for("/canary", &v1);
        trigger.function_reference = FunctionReference::WeightedGroup {
            functions: vec![
                WeightedFunction { function: v1.clone(), weight: 90 },
                WeightedFunction { function: v2.clone(), weight: 10 },
            ],
        };

        let resolver = Arc::new(SequenceResolver::new(vec![backend.clone()]));
        let cache = Arc::new(FunctionServiceCache::new(Duration::ZERO, 0));
        let router = FunctionRouter::new(test_params(), cache, resolver.clone())
            .with_selector(Arc::new(LastMember));
        router.update_triggers(vec![trigger]).unwrap();
        let router = web::Data::new(router);
        let app = ingress!(router);

        let req = test::TestRequest::get().uri("/canary").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(router.cache().lookup(&v2), Some(backend));
        assert!(router.cache().lookup(&v1).is_none());
    }
}
