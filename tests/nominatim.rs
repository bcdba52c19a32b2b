use httptest::matchers::{all_of, contains, request, url_decoded};
use httptest::responders::{json_encoded, status_code};
use httptest::{Expectation, Server};
use serde_json::json;

use duosync_geo::{Coordinates, Geocoder, NominatimClient, SyncConfig};

fn client_for(server: &Server) -> NominatimClient {
    let config = SyncConfig {
        geocoder_endpoint: server.url("/search").to_string(),
        geocoder_user_agent: "duosync-geo-tests/1.0".to_string(),
        ..SyncConfig::default()
    };
    NominatimClient::new(&config).expect("client builds")
}

#[tokio::test]
async fn sends_identifying_user_agent_and_parses_first_result() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of!(
            request::method("GET"),
            request::path("/search"),
            request::headers(contains(("user-agent", "duosync-geo-tests/1.0"))),
            request::query(url_decoded(contains(("format", "json")))),
            request::query(url_decoded(contains(("q", "Ponta Negra, Natal")))),
            request::query(url_decoded(contains(("limit", "1"))))
        ))
        .respond_with(json_encoded(json!([
            {
                "lat": "-5.8810",
                "lon": "-35.1690",
                "display_name": "Ponta Negra, Natal, Rio Grande do Norte, Brasil"
            },
            {
                "lat": "0.0",
                "lon": "0.0",
                "display_name": "somewhere else"
            }
        ]))),
    );

    let client = client_for(&server);
    let coords = client.resolve("Ponta Negra, Natal").await.unwrap();
    assert_eq!(
        coords,
        Some(Coordinates {
            lat: -5.8810,
            lng: -35.1690
        })
    );
}

#[tokio::test]
async fn empty_result_set_means_not_found() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/search"))
            .respond_with(json_encoded(json!([]))),
    );

    let client = client_for(&server);
    assert_eq!(client.resolve("Rua Inexistente").await.unwrap(), None);
}

#[tokio::test]
async fn server_errors_map_to_none_instead_of_failing() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/search"))
            .respond_with(status_code(503)),
    );

    let client = client_for(&server);
    assert_eq!(client.resolve("Qualquer coisa").await.unwrap(), None);
}

#[tokio::test]
async fn malformed_coordinates_map_to_none() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/search")).respond_with(json_encoded(
            json!([{ "lat": "not-a-number", "lon": "-35.1", "display_name": "x" }]),
        )),
    );

    let client = client_for(&server);
    assert_eq!(client.resolve("Rua Estranha").await.unwrap(), None);
}

#[tokio::test]
async fn blank_queries_never_reach_the_network() {
    let server = Server::run();
    // no expectations registered: any request would fail the test
    let client = client_for(&server);
    assert_eq!(client.resolve("   ").await.unwrap(), None);
}
