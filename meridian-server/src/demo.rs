//! The demo dataset: a `places` service with one `restaurant` feature
//! type in the Dutch RD New system (EPSG:28992), backed by the in-memory
//! datastore. Used by the default binary and the integration tests.

use crate::state::AppState;
use meridian_core::crs::{Crs, CRS84, WEB_MERCATOR, WGS84};
use meridian_core::values::{parse_iso_datetime, ScalarValue};
use meridian_core::{Geometry, GeometryKind, GeometryType, ServiceConfig};
use meridian_fes::functions::FunctionRegistry;
use meridian_fes::wfs::stored::StoredQueryRegistry;
use meridian_output::capabilities::ServiceDescription;
use meridian_query::{FieldValue, MemoryDatastore, Record};
use meridian_schema::{FeatureType, FeatureTypeRegistry, XsdType};
use geo_types::point;
use std::sync::Arc;

pub const APP_NAMESPACE: &str = "http://example.org/gisserver";

/// Build the demo application state.
pub fn demo_state(config: ServiceConfig, base_url: impl Into<String>) -> AppState {
    let rd_new = Crs::from_srid(28992).expect("EPSG:28992 is in the projection database");

    let mut registry = FeatureTypeRegistry::new(APP_NAMESPACE);
    registry.register(
        FeatureType::build("restaurant", APP_NAMESPACE)
            .title("Restaurants")
            .abstract_text("All restaurants exposed by the demo dataset")
            .keyword("food")
            .crs(rd_new.clone())
            .other_crs(WGS84.clone())
            .other_crs(CRS84.clone())
            .other_crs(WEB_MERCATOR.clone())
            .gml_name_from("name")
            .geometry("location", GeometryType::Point)
            .field("name", XsdType::String)
            .field("rating", XsdType::Double)
            .field("is_open", XsdType::Boolean)
            .field("created", XsdType::DateTime)
            .complex("city", false, |c| {
                c.field("name", XsdType::String).field("region", XsdType::String)
            })
            .array("tags", XsdType::String)
            .finish()
            .expect("demo schema is valid"),
    );

    let functions = Arc::new(FunctionRegistry::with_defaults());
    let mut store = MemoryDatastore::new(functions.clone());
    for record in demo_restaurants(&rd_new) {
        store.insert("restaurant", record);
    }

    AppState {
        config,
        service: ServiceDescription {
            title: "Places".to_string(),
            abstract_text: Some("Demo GIS server".to_string()),
            keywords: vec!["wfs".to_string(), "demo".to_string()],
            provider_name: Some("Meridian".to_string()),
            provider_site: None,
            contact_person: None,
        },
        registry,
        stored_queries: StoredQueryRegistry::with_builtins(),
        functions,
        store: Arc::new(store),
        base_url: base_url.into(),
    }
}

fn demo_restaurants(rd_new: &Crs) -> Vec<Record> {
    let mut records = Vec::new();
    // RD New coordinates (x/y in meters).
    let rows: Vec<(i64, &str, f64, bool, &str, (&str, &str), Vec<&str>, (f64, f64))> = vec![
        (
            1,
            "Café Noir",
            4.5,
            true,
            "2020-04-05T12:11:10Z",
            ("Amsterdam", "North Holland"),
            vec!["bar", "coffee"],
            (121500.0, 487200.0),
        ),
        (
            2,
            "Snackbar Goud",
            2.0,
            true,
            "2020-04-06T09:00:00Z",
            ("Amsterdam", "North Holland"),
            vec!["fastfood"],
            (122000.0, 486500.0),
        ),
        (
            3,
            "Café Brecht",
            3.5,
            false,
            "2021-01-20T18:30:00Z",
            ("Utrecht", "Utrecht"),
            vec!["bar"],
            (136600.0, 455900.0),
        ),
        (
            4,
            "Restaurant Zilver",
            3.0,
            true,
            "2022-07-01T17:00:00Z",
            ("Amsterdam", "North Holland"),
            vec![],
            (120800.0, 488000.0),
        ),
    ];

    for (id, name, rating, is_open, created, (city, region), tags, (x, y)) in rows {
        let mut city_record = Record::new();
        city_record.set("name", FieldValue::Scalar(ScalarValue::String(city.into())));
        city_record.set(
            "region",
            FieldValue::Scalar(ScalarValue::String(region.into())),
        );

        let mut record = Record::new();
        record.set("id", FieldValue::Scalar(ScalarValue::Integer(id)));
        record.set("name", FieldValue::Scalar(ScalarValue::String(name.into())));
        record.set("rating", FieldValue::Scalar(ScalarValue::Double(rating)));
        record.set("is_open", FieldValue::Scalar(ScalarValue::Bool(is_open)));
        record.set(
            "created",
            FieldValue::Scalar(ScalarValue::DateTime(
                parse_iso_datetime(created).expect("demo datetime"),
            )),
        );
        record.set("city", FieldValue::Record(city_record));
        record.set(
            "tags",
            FieldValue::List(
                tags.into_iter()
                    .map(|tag| FieldValue::Scalar(ScalarValue::String(tag.to_string())))
                    .collect(),
            ),
        );
        record.set(
            "location",
            FieldValue::Geometry(Geometry::new(
                rd_new.clone(),
                GeometryKind::Point(point!(x: x, y: y)),
            )),
        );
        records.push(record);
    }
    records
}
