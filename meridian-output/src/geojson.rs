//! The GeoJSON renderer.
//!
//! GeoJSON always emits coordinates in CRS84 (x/y) regardless of the
//! requested `srsName`, to keep web clients simple; the collection is
//! stamped with the CRS84 urn. The count fields and pagination links live
//! in the footer, which allows writing them after iterating without an
//! up-front count query.

use crate::buffer::{spawn_chunk_stream, ChunkWriter};
use crate::gml32::StreamError;
use crate::utils::content_disposition;
use crate::RenderContext;
use bytes::Bytes;
use futures::Stream;
use meridian_core::crs::CRS84;
use meridian_core::error::Result;
use meridian_core::values::ScalarValue;
use meridian_core::{Geometry, GeometryKind};
use meridian_query::{FeatureCollection, FieldValue, Record, SimpleFeatureCollection};
use meridian_schema::{NodeId, NodeKind};
use serde_json::{json, Map, Value};

/// Fast GeoJSON renderer over a stream response.
pub struct GeoJsonRenderer {
    pub ctx: RenderContext,
    pub collection: FeatureCollection,
}

impl GeoJsonRenderer {
    pub fn content_disposition(&self) -> String {
        let type_names: Vec<String> = self
            .collection
            .results
            .iter()
            .map(|sub| sub.feature_type.name.clone())
            .collect();
        let (start, limit) = self
            .collection
            .results
            .first()
            .map(|sub| (sub.start, sub.limit))
            .unwrap_or((0, None));
        content_disposition(
            false,
            &type_names,
            start,
            limit,
            &self.collection.timestamp,
            "geojson",
        )
    }

    pub fn into_stream(self) -> impl Stream<Item = Bytes> + Send {
        let chunk_size = self.ctx.config.chunk_size;
        spawn_chunk_stream(chunk_size, move |mut out| async move {
            if let Err(StreamError::Wfs(error)) = self.render(&mut out).await {
                tracing::error!(error = %error, "GeoJSON rendering aborted mid-stream");
                // Close the features array and surface the error as a
                // member of the document rather than ending silently.
                out.write(&format!(
                    "\n  ],\n  \"exception\": {},\n  \"numberReturned\": null\n}}\n",
                    Value::String(error.to_string())
                ));
                let _ = out.finish().await;
            }
        })
    }

    async fn render(&self, out: &mut ChunkWriter) -> std::result::Result<(), StreamError> {
        out.write(&format!(
            "{{\"type\":\"FeatureCollection\",\
             \"timeStamp\":{},\
             \"crs\":{{\"type\":\"name\",\"properties\":{{\"name\":\"urn:ogc:def:crs:OGC::CRS84\"}}}},\
             \n  \"features\": [\n",
            Value::String(self.collection.timestamp.clone()),
        ));

        let mut number_returned: u64 = 0;
        let mut first = true;
        for sub in &self.collection.results {
            let mut cursor = self
                .ctx
                .store
                .open_cursor(
                    &sub.feature_type.name,
                    &sub.query,
                    sub.start,
                    sub.limit,
                    self.ctx.config.cursor_chunk_size,
                )
                .await
                .map_err(StreamError::Wfs)?;
            while let Some(chunk) = cursor.next_chunk().await.map_err(StreamError::Wfs)? {
                for record in chunk {
                    if !first {
                        out.write(",\n");
                    }
                    first = false;
                    number_returned += 1;
                    let feature = render_feature(sub, &record)?;
                    out.write("    ");
                    out.write(&feature.to_string());
                    out.maybe_flush().await?;
                }
            }
        }

        out.write("\n  ],\n");
        out.write(&self.render_footer(number_returned));
        out.write("\n");
        out.flush().await?;
        Ok(())
    }

    fn render_footer(&self, number_returned: u64) -> String {
        let mut links = Vec::new();
        if let Some(next) = &self.collection.next {
            links.push(json!({
                "href": next,
                "rel": "next",
                "type": "application/geo+json",
                "title": "next page",
            }));
        }
        if let Some(previous) = &self.collection.previous {
            links.push(json!({
                "href": previous,
                "rel": "previous",
                "type": "application/geo+json",
                "title": "previous page",
            }));
        }
        let number_matched = match self.collection.number_matched() {
            Some(count) => json!(count),
            None => json!("unknown"),
        };
        format!(
            "  \"links\": {},\n  \"numberReturned\": {},\n  \"numberMatched\": {}\n}}",
            Value::Array(links),
            number_returned,
            number_matched
        )
    }
}

fn render_feature(sub: &SimpleFeatureCollection, record: &Record) -> Result<Value> {
    let feature_type = &sub.feature_type;
    let pk = record.scalar_at(feature_type.id_path());

    let mut feature = Map::new();
    feature.insert("type".into(), json!("Feature"));
    feature.insert("id".into(), json!(format!("{}.{}", feature_type.name, pk)));

    // The display name, when the feature type exposes one.
    if feature_type.show_gml_name {
        for id in sub.projection.root_elements() {
            let node = sub.projection.node(*id);
            if matches!(node.kind, NodeKind::GmlName) {
                if let Some(path) = &node.source_path {
                    feature.insert("geometry_name".into(), scalar_json(&record.scalar_at(path)));
                }
            }
        }
    }

    feature.insert("geometry".into(), render_geometry(sub, record)?);
    feature.insert(
        "properties".into(),
        render_properties(sub, record, sub.projection.root_elements())?,
    );
    Ok(Value::Object(feature))
}

fn render_geometry(sub: &SimpleFeatureCollection, record: &Record) -> Result<Value> {
    let Some(main) = sub.projection.main_geometry_element() else {
        return Ok(Value::Null);
    };
    let node = sub.projection.node(main);
    let Some(path) = &node.source_path else {
        return Ok(Value::Null);
    };
    // A pre-rendered fragment from the datastore wins.
    if let Some(fragment) = record.annotation(&format!("_as_geojson_{}", path.replace('.', "_"))) {
        if let Ok(value) = serde_json::from_str::<Value>(fragment) {
            return Ok(value);
        }
    }
    match record.geometry_at(path) {
        None => Ok(Value::Null),
        Some(geometry) => {
            let transformed = CRS84.apply_to(geometry)?;
            Ok(geometry_json(&transformed))
        }
    }
}

/// GeoJSON geometry object; coordinates are already x/y.
pub fn geometry_json(geometry: &Geometry) -> Value {
    kind_json(&geometry.kind)
}

fn kind_json(kind: &GeometryKind) -> Value {
    fn coord(c: &geo_types::Coord<f64>) -> Value {
        json!([c.x, c.y])
    }
    fn line(l: &geo_types::LineString<f64>) -> Value {
        Value::Array(l.0.iter().map(coord).collect())
    }
    fn polygon(p: &geo_types::Polygon<f64>) -> Value {
        let mut rings = vec![line(p.exterior())];
        rings.extend(p.interiors().iter().map(line));
        Value::Array(rings)
    }

    match kind {
        GeometryKind::Point(p) => json!({"type": "Point", "coordinates": [p.x(), p.y()]}),
        GeometryKind::LineString(l) | GeometryKind::LinearRing(l) => {
            json!({"type": "LineString", "coordinates": line(l)})
        }
        GeometryKind::Polygon(p) => json!({"type": "Polygon", "coordinates": polygon(p)}),
        GeometryKind::MultiPoint(mp) => json!({
            "type": "MultiPoint",
            "coordinates": Value::Array(mp.0.iter().map(|p| json!([p.x(), p.y()])).collect::<Vec<_>>()),
        }),
        GeometryKind::MultiLineString(ml) => json!({
            "type": "MultiLineString",
            "coordinates": Value::Array(ml.0.iter().map(line).collect::<Vec<_>>()),
        }),
        GeometryKind::MultiPolygon(mp) => json!({
            "type": "MultiPolygon",
            "coordinates": Value::Array(mp.0.iter().map(polygon).collect::<Vec<_>>()),
        }),
        GeometryKind::GeometryCollection(members) => json!({
            "type": "GeometryCollection",
            "geometries": Value::Array(members.iter().map(kind_json).collect::<Vec<_>>()),
        }),
    }
}

fn render_properties(
    sub: &SimpleFeatureCollection,
    record: &Record,
    elements: &[NodeId],
) -> Result<Value> {
    let mut properties = Map::new();
    for id in elements {
        let node = sub.projection.node(*id);
        if node.is_geometry() || matches!(node.kind, NodeKind::GmlName | NodeKind::GmlBoundedBy) {
            continue;
        }
        let Some(path) = &node.source_path else {
            continue;
        };
        let values = record.resolve_path(path);

        let json_value = if node.is_complex() {
            let children = sub.projection.child_nodes(*id);
            if node.is_many() {
                let mut items = Vec::new();
                for value in values {
                    if let FieldValue::Record(nested) = value {
                        items.push(nested_properties(sub, nested, children)?);
                    }
                }
                Value::Array(items)
            } else {
                match values.first() {
                    Some(FieldValue::Record(nested)) => nested_properties(sub, nested, children)?,
                    _ => Value::Null,
                }
            }
        } else if node.is_many() {
            Value::Array(
                values
                    .iter()
                    .filter_map(|v| v.as_scalar())
                    .map(scalar_json)
                    .collect(),
            )
        } else {
            match values.first().and_then(|v| v.as_scalar()) {
                Some(scalar) => scalar_json(scalar),
                None => Value::Null,
            }
        };
        properties.insert(node.name.clone(), json_value);
    }
    Ok(Value::Object(properties))
}

fn nested_properties(
    sub: &SimpleFeatureCollection,
    record: &Record,
    elements: &[NodeId],
) -> Result<Value> {
    render_properties(sub, record, elements)
}

fn scalar_json(value: &ScalarValue) -> Value {
    match value {
        ScalarValue::Null => Value::Null,
        ScalarValue::Bool(b) => json!(b),
        ScalarValue::Integer(i) => json!(i),
        ScalarValue::Double(d) => json!(d),
        ScalarValue::String(s) => json!(s),
        ScalarValue::Date(d) => json!(d.to_string()),
        ScalarValue::DateTime(dt) => {
            json!(dt.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true))
        }
        ScalarValue::Time(t) => json!(t.to_string()),
    }
}
