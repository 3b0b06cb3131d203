//! The GML 3.2 renderer for GetFeature and GetPropertyValue.
//!
//! XML output cannot stream the header last: `numberReturned` sits on the
//! root tag, so the page is fetched before the first byte goes out. The
//! member list is still written and flushed chunk-wise.

use crate::buffer::{spawn_chunk_stream, ChunkWriter, Disconnected};
use crate::utils::{
    content_disposition, fmt_pos_list, fmt_position, scalar_to_xml_text, xml_escape,
};
use crate::RenderContext;
use bytes::Bytes;
use futures::Stream;
use meridian_core::error::{Result, WfsError};
use meridian_core::values::ScalarValue;
use meridian_core::{Crs, Geometry, GeometryKind};
use meridian_query::{
    CompiledQuery, FeatureCollection, FieldValue, GeoTextFormat, GeometryTextRequest, Record,
    SimpleFeatureCollection,
};
use meridian_schema::{NodeId, NodeKind};

const WFS_SCHEMA_LOCATION: &str =
    "http://www.opengis.net/wfs/2.0 http://schemas.opengis.net/wfs/2.0/wfs.xsd";
const GML_SCHEMA_LOCATION: &str =
    "http://www.opengis.net/gml/3.2 http://schemas.opengis.net/gml/3.2.1/gml.xsd";

pub(crate) enum StreamError {
    Disconnected,
    Wfs(WfsError),
}

impl From<Disconnected> for StreamError {
    fn from(_: Disconnected) -> Self {
        StreamError::Disconnected
    }
}

impl From<WfsError> for StreamError {
    fn from(error: WfsError) -> Self {
        StreamError::Wfs(error)
    }
}

/// Annotation name for DB-rendered GML fragments of one geometry path.
fn gml_annotation(path: &str) -> String {
    format!("_as_gml_{}", path.replace('.', "_"))
}

/// Ask the datastore to pre-render geometry fragments (the `ST_AsGML`
/// optimization). Backends that don't implement it leave the annotations
/// empty and the in-process path takes over per row.
pub fn decorate_query(
    query: &mut CompiledQuery,
    collection: &SimpleFeatureCollection,
    output_crs: &Crs,
    precision: usize,
) {
    for id in collection.projection.geometry_elements() {
        let node = collection.projection.node(id);
        if let Some(path) = &node.source_path {
            query.geometry_text.push(GeometryTextRequest {
                name: gml_annotation(path),
                path: path.clone(),
                format: GeoTextFormat::Gml,
                srid: output_crs.srid,
                precision,
            });
        }
    }
}

/// Render the GetFeature XML output in GML 3.2 format.
pub struct Gml32Renderer {
    pub ctx: RenderContext,
    pub collection: FeatureCollection,
}

impl Gml32Renderer {
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
            "xml",
        )
    }

    pub fn into_stream(self) -> impl Stream<Item = Bytes> + Send {
        let chunk_size = self.ctx.config.chunk_size;
        spawn_chunk_stream(chunk_size, move |mut out| async move {
            if let Err(StreamError::Wfs(error)) = self.render(&mut out).await {
                // The header already went out; append the spec's hidden
                // gem for mid-stream failures and close the document.
                tracing::error!(error = %error, "GML rendering aborted mid-stream");
                out.write("  <wfs:truncatedResponse>");
                out.write(&crate::exception::exception_report_body(&error));
                out.write("</wfs:truncatedResponse>\n</wfs:FeatureCollection>\n");
                let _ = out.finish().await;
            }
        })
    }

    async fn render(&self, out: &mut ChunkWriter) -> std::result::Result<(), StreamError> {
        let mut pages: Vec<Vec<Record>> = Vec::with_capacity(self.collection.results.len());
        for sub in &self.collection.results {
            pages.push(fetch_page(&self.ctx, sub).await?);
        }
        let number_returned: usize = pages.iter().map(Vec::len).sum();

        self.write_header(out, number_returned);
        out.maybe_flush().await?;

        let nested = self.collection.results.len() > 1;
        let mut feature_buf = String::new();
        for (sub, rows) in self.collection.results.iter().zip(&pages) {
            if nested {
                out.write(&format!(
                    "<wfs:member>\n<wfs:FeatureCollection timeStamp=\"{}\" \
                     numberMatched=\"{}\" numberReturned=\"{}\">\n",
                    self.collection.timestamp,
                    number_matched_text(sub.number_matched),
                    rows.len()
                ));
            }
            for record in rows {
                feature_buf.clear();
                // A fresh sequence per feature keeps geometry gml:ids
                // unique within the response.
                let mut gml_seq = 0u32;
                write_feature(&mut feature_buf, &self.ctx, sub, record, &mut gml_seq, "")?;
                out.write("<wfs:member>\n");
                out.write(&feature_buf);
                out.write("</wfs:member>\n");
                out.maybe_flush().await?;
            }
            if nested {
                out.write("</wfs:FeatureCollection>\n</wfs:member>\n");
            }
        }

        out.write("</wfs:FeatureCollection>\n");
        out.flush().await?;
        Ok(())
    }

    fn write_header(&self, out: &mut ChunkWriter, number_returned: usize) {
        let number_matched = number_matched_text(self.collection.number_matched());
        let mut pagination = String::new();
        if let Some(next) = &self.collection.next {
            pagination.push_str(&format!(" next=\"{}\"", xml_escape(next)));
        }
        if let Some(previous) = &self.collection.previous {
            pagination.push_str(&format!(" previous=\"{}\"", xml_escape(previous)));
        }

        out.write(&format!(
            "<?xml version='1.0' encoding=\"UTF-8\" ?>\n\
             <wfs:FeatureCollection {xmlns}\
             \u{20}xsi:schemaLocation=\"{schema_location}\"\
             \u{20}timeStamp=\"{timestamp}\"\
             \u{20}numberMatched=\"{number_matched}\"\
             \u{20}numberReturned=\"{number_returned}\"{pagination}>\n",
            xmlns = self.xmlns_attributes(),
            schema_location = xml_escape(&self.schema_location()),
            timestamp = self.collection.timestamp,
        ));
    }

    fn xmlns_attributes(&self) -> String {
        xmlns_attributes(&self.ctx)
    }

    fn schema_location(&self) -> String {
        let type_names: Vec<String> = self
            .collection
            .results
            .iter()
            .map(|sub| sub.feature_type.xml_name())
            .collect();
        schema_location(&self.ctx, &type_names)
    }
}

fn xmlns_attributes(ctx: &RenderContext) -> String {
    format!(
        "xmlns:wfs=\"http://www.opengis.net/wfs/2.0\" \
         xmlns:gml=\"http://www.opengis.net/gml/3.2\" \
         xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" \
         xmlns:{}=\"{}\"",
        ctx.app_prefix,
        xml_escape(&ctx.app_namespace)
    )
}

fn schema_location(ctx: &RenderContext, type_names: &[String]) -> String {
    let describe_url = format!(
        "{}?SERVICE=WFS&VERSION=2.0.0&REQUEST=DescribeFeatureType&TYPENAMES={}",
        ctx.base_url,
        type_names.join(",")
    );
    format!(
        "{} {} {} {}",
        ctx.app_namespace, describe_url, WFS_SCHEMA_LOCATION, GML_SCHEMA_LOCATION
    )
}

fn number_matched_text(count: Option<u64>) -> String {
    match count {
        Some(count) => count.to_string(),
        None => "unknown".to_string(),
    }
}

pub(crate) async fn fetch_page(
    ctx: &RenderContext,
    sub: &SimpleFeatureCollection,
) -> Result<Vec<Record>> {
    let mut cursor = ctx
        .store
        .open_cursor(
            &sub.feature_type.name,
            &sub.query,
            sub.start,
            sub.limit,
            ctx.config.cursor_chunk_size,
        )
        .await?;
    let mut rows = Vec::new();
    while let Some(chunk) = cursor.next_chunk().await? {
        rows.extend(chunk);
    }
    Ok(rows)
}

/// Write one `<app:type gml:id="...">` feature element into the buffer.
pub(crate) fn write_feature(
    out: &mut String,
    ctx: &RenderContext,
    sub: &SimpleFeatureCollection,
    record: &Record,
    gml_seq: &mut u32,
    extra_xmlns: &str,
) -> Result<()> {
    let feature_type = &sub.feature_type;
    let projection = &sub.projection;
    let qname = feature_type.xml_name();
    let pk = record.scalar_at(feature_type.id_path());

    out.push_str(&format!(
        "<{qname} gml:id=\"{}.{}\"{extra_xmlns}>\n",
        xml_escape(&feature_type.name),
        xml_escape(&pk.to_string())
    ));
    for id in projection.root_elements() {
        write_element(out, ctx, sub, record, *id, gml_seq)?;
    }
    out.push_str(&format!("</{qname}>\n"));
    Ok(())
}

fn write_element(
    out: &mut String,
    ctx: &RenderContext,
    sub: &SimpleFeatureCollection,
    record: &Record,
    id: NodeId,
    gml_seq: &mut u32,
) -> Result<()> {
    let projection = &sub.projection;
    let node = projection.node(id);

    match node.kind {
        NodeKind::GmlBoundedBy => {
            if let Some(bounds) = render_bounded_by(ctx, sub, record)? {
                out.push_str(&bounds);
            }
            Ok(())
        }
        NodeKind::Geometry(_) => write_geometry_element(out, ctx, sub, record, id, gml_seq),
        _ => {
            let qname = node.xml_qname();
            let path = node.source_path.as_deref().unwrap_or("");
            let values = record.resolve_path(path);

            if node.is_many() {
                if values.is_empty() && node.min_occurs > 0 {
                    out.push_str(&format!("<{qname} xsi:nil=\"true\"/>\n"));
                }
                for value in values {
                    write_value(out, ctx, sub, id, &qname, Some(value), gml_seq)?;
                }
                Ok(())
            } else {
                write_value(out, ctx, sub, id, &qname, values.first().copied(), gml_seq)
            }
        }
    }
}

fn write_value(
    out: &mut String,
    ctx: &RenderContext,
    sub: &SimpleFeatureCollection,
    id: NodeId,
    qname: &str,
    value: Option<&FieldValue>,
    gml_seq: &mut u32,
) -> Result<()> {
    match value {
        None | Some(FieldValue::Scalar(ScalarValue::Null)) => {
            out.push_str(&format!("<{qname} xsi:nil=\"true\"/>\n"));
            Ok(())
        }
        Some(FieldValue::Scalar(scalar)) => {
            let text = match scalar {
                ScalarValue::String(s) => xml_escape(s),
                other => scalar_to_xml_text(other),
            };
            out.push_str(&format!("<{qname}>{text}</{qname}>\n"));
            Ok(())
        }
        Some(FieldValue::Record(nested)) => {
            out.push_str(&format!("<{qname}>\n"));
            for child in sub.projection.child_nodes(id) {
                write_element(out, ctx, sub, nested, *child, gml_seq)?;
            }
            out.push_str(&format!("</{qname}>\n"));
            Ok(())
        }
        Some(FieldValue::List(items)) => {
            for item in items {
                write_value(out, ctx, sub, id, qname, Some(item), gml_seq)?;
            }
            Ok(())
        }
        Some(FieldValue::Geometry(geometry)) => {
            let gml = render_geometry_value(ctx, sub, geometry, "")?;
            out.push_str(&format!("<{qname}>{gml}</{qname}>\n"));
            Ok(())
        }
    }
}

fn write_geometry_element(
    out: &mut String,
    ctx: &RenderContext,
    sub: &SimpleFeatureCollection,
    record: &Record,
    id: NodeId,
    gml_seq: &mut u32,
) -> Result<()> {
    let node = sub.projection.node(id);
    let qname = node.xml_qname();
    let path = node.source_path.as_deref().unwrap_or("");

    // A pre-rendered fragment from the datastore wins.
    if let Some(fragment) = record.annotation(&gml_annotation(path)) {
        *gml_seq += 1;
        out.push_str(&format!("<{qname}>{fragment}</{qname}>\n"));
        return Ok(());
    }

    match record.geometry_at(path) {
        None => {
            out.push_str(&format!("<{qname} xsi:nil=\"true\"/>\n"));
            Ok(())
        }
        Some(geometry) => {
            let pk = record.scalar_at(sub.feature_type.id_path());
            *gml_seq += 1;
            let gml_id = format!("{}.{}.{}", sub.feature_type.name, pk, gml_seq);
            let base_attrs = format!(
                " gml:id=\"{}\" srsName=\"{}\"",
                xml_escape(&gml_id),
                xml_escape(&sub.projection.output_crs.to_string())
            );
            let gml = render_geometry_value(ctx, sub, geometry, &base_attrs)?;
            out.push_str(&format!("<{qname}>{gml}</{qname}>\n"));
            Ok(())
        }
    }
}

fn render_geometry_value(
    ctx: &RenderContext,
    sub: &SimpleFeatureCollection,
    geometry: &Geometry,
    base_attrs: &str,
) -> Result<String> {
    let output_crs = &sub.projection.output_crs;
    let transformed = output_crs.apply_to(geometry)?;
    Ok(render_gml_kind(
        &transformed.kind,
        output_crs,
        base_attrs,
        ctx.config.coordinate_precision,
    ))
}

/// Render a geometry with GML 3.2 tag names and the axis order of the
/// output CRS.
pub fn render_gml_kind(
    kind: &GeometryKind,
    crs: &Crs,
    base_attrs: &str,
    precision: usize,
) -> String {
    match kind {
        GeometryKind::Point(point) => format!(
            "<gml:Point{base_attrs}><gml:pos srsDimension=\"2\">{}</gml:pos></gml:Point>",
            fmt_position(point.x(), point.y(), crs, precision)
        ),
        GeometryKind::LineString(line) => format!(
            "<gml:LineString{base_attrs}><gml:posList srsDimension=\"2\">{}</gml:posList></gml:LineString>",
            fmt_pos_list(&line.0, crs, precision)
        ),
        GeometryKind::LinearRing(ring) => format!(
            "<gml:LinearRing{base_attrs}><gml:posList srsDimension=\"2\">{}</gml:posList></gml:LinearRing>",
            fmt_pos_list(&ring.0, crs, precision)
        ),
        GeometryKind::Polygon(polygon) => {
            let mut buffer = format!("<gml:Polygon{base_attrs}><gml:exterior>");
            buffer.push_str(&render_gml_kind(
                &GeometryKind::LinearRing(polygon.exterior().clone()),
                crs,
                "",
                precision,
            ));
            buffer.push_str("</gml:exterior>");
            for interior in polygon.interiors() {
                buffer.push_str("<gml:interior>");
                buffer.push_str(&render_gml_kind(
                    &GeometryKind::LinearRing(interior.clone()),
                    crs,
                    "",
                    precision,
                ));
                buffer.push_str("</gml:interior>");
            }
            buffer.push_str("</gml:Polygon>");
            buffer
        }
        GeometryKind::MultiPoint(points) => {
            let members: String = points
                .0
                .iter()
                .map(|p| {
                    format!(
                        "<gml:pointMember>{}</gml:pointMember>",
                        render_gml_kind(&GeometryKind::Point(*p), crs, "", precision)
                    )
                })
                .collect();
            format!("<gml:MultiPoint{base_attrs}>{members}</gml:MultiPoint>")
        }
        GeometryKind::MultiLineString(lines) => {
            let members: String = lines
                .0
                .iter()
                .map(|l| {
                    format!(
                        "<gml:lineStringMember>{}</gml:lineStringMember>",
                        render_gml_kind(&GeometryKind::LineString(l.clone()), crs, "", precision)
                    )
                })
                .collect();
            format!("<gml:MultiLineString{base_attrs}>{members}</gml:MultiLineString>")
        }
        GeometryKind::MultiPolygon(polygons) => {
            let members: String = polygons
                .0
                .iter()
                .map(|p| {
                    format!(
                        "<gml:surfaceMember>{}</gml:surfaceMember>",
                        render_gml_kind(&GeometryKind::Polygon(p.clone()), crs, "", precision)
                    )
                })
                .collect();
            format!("<gml:MultiPolygon{base_attrs}>{members}</gml:MultiPolygon>")
        }
        GeometryKind::GeometryCollection(members) => {
            let rendered: String = members
                .iter()
                .map(|member| {
                    format!(
                        "<gml:geometryMember>{}</gml:geometryMember>",
                        render_gml_kind(member, crs, "", precision)
                    )
                })
                .collect();
            format!("<gml:MultiGeometry{base_attrs}>{rendered}</gml:MultiGeometry>")
        }
    }
}

fn render_bounded_by(
    ctx: &RenderContext,
    sub: &SimpleFeatureCollection,
    record: &Record,
) -> Result<Option<String>> {
    let output_crs = &sub.projection.output_crs;
    let mut bbox = meridian_core::BoundingBox::empty(Some(output_crs.clone()));
    for id in sub.projection.geometry_elements() {
        let node = sub.projection.node(id);
        if let Some(path) = &node.source_path {
            if let Some(geometry) = record.geometry_at(path) {
                bbox.extend_to_geometry(geometry)?;
            }
        }
    }
    if bbox.is_empty() {
        return Ok(None);
    }
    let precision = ctx.config.coordinate_precision;
    let lower = fmt_position(bbox.min_x, bbox.min_y, output_crs, precision);
    let upper = fmt_position(bbox.max_x, bbox.max_y, output_crs, precision);
    Ok(Some(format!(
        "<gml:boundedBy><gml:Envelope srsDimension=\"2\" srsName=\"{}\">\
         <gml:lowerCorner>{lower}</gml:lowerCorner>\
         <gml:upperCorner>{upper}</gml:upperCorner>\
         </gml:Envelope></gml:boundedBy>\n",
        xml_escape(&output_crs.to_string())
    )))
}

/// Render a standalone feature for GetFeatureById: no collection wrapper,
/// namespaces on the feature element itself. Not streamed, so the 404 for
/// a missing feature can still become a proper status code.
pub async fn render_feature_by_id(
    ctx: &RenderContext,
    sub: &SimpleFeatureCollection,
) -> Result<String> {
    let rows = fetch_page(ctx, sub).await?;
    let Some(record) = rows.first() else {
        return Err(WfsError::not_found("Feature not found.").locator("ID"));
    };

    let extra_xmlns = format!(
        " xmlns:gml=\"http://www.opengis.net/gml/3.2\" \
         xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" \
         xmlns:{}=\"{}\"",
        ctx.app_prefix,
        xml_escape(&ctx.app_namespace)
    );

    let mut body = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let mut gml_seq = 0;
    write_feature(&mut body, ctx, sub, record, &mut gml_seq, &extra_xmlns)?;
    Ok(body)
}


/// Render the GetPropertyValue XML output: a `wfs:ValueCollection` whose
/// members hold the single requested node per row.
pub struct GmlValueRenderer {
    pub ctx: RenderContext,
    pub collection: FeatureCollection,
}

impl GmlValueRenderer {
    pub fn into_stream(self) -> impl Stream<Item = Bytes> + Send {
        let chunk_size = self.ctx.config.chunk_size;
        spawn_chunk_stream(chunk_size, move |mut out| async move {
            if let Err(StreamError::Wfs(error)) = self.render(&mut out).await {
                tracing::error!(error = %error, "value rendering aborted mid-stream");
                out.write("  <wfs:truncatedResponse>");
                out.write(&crate::exception::exception_report_body(&error));
                out.write("</wfs:truncatedResponse>\n</wfs:ValueCollection>\n");
                let _ = out.finish().await;
            }
        })
    }

    async fn render(&self, out: &mut ChunkWriter) -> std::result::Result<(), StreamError> {
        let sub = &self.collection.results[0];
        let rows = fetch_page(&self.ctx, sub).await?;
        let node_id = sub
            .projection
            .value_node()
            .ok_or_else(|| WfsError::internal("value projection missing"))?;

        out.write(&format!(
            "<?xml version='1.0' encoding=\"UTF-8\" ?>\n\
             <wfs:ValueCollection {xmlns}\
             \u{20}xsi:schemaLocation=\"{schema_location}\"\
             \u{20}timeStamp=\"{timestamp}\"\
             \u{20}numberMatched=\"{number_matched}\"\
             \u{20}numberReturned=\"{number_returned}\">\n",
            xmlns = xmlns_attributes(&self.ctx),
            schema_location =
                xml_escape(&schema_location(&self.ctx, &[sub.feature_type.xml_name()])),
            timestamp = self.collection.timestamp,
            number_matched = number_matched_text(sub.number_matched),
            number_returned = rows.len(),
        ));

        let node = sub.projection.node(node_id);
        let qname = node.xml_qname();
        let mut gml_seq = 0u32;
        for record in &rows {
            let path = node.source_path.as_deref().unwrap_or("");
            let values = record.resolve_path(path);
            if node.is_attribute() {
                // Attribute values render as bare text members.
                if let Some(FieldValue::Scalar(scalar)) = values.first() {
                    out.write(&format!(
                        "<wfs:member>{}</wfs:member>\n",
                        xml_escape(&scalar_to_xml_text(scalar))
                    ));
                }
            } else if node.is_geometry() {
                let inner = match record.geometry_at(path) {
                    Some(geometry) => {
                        let pk = record.scalar_at(sub.feature_type.id_path());
                        gml_seq += 1;
                        let base_attrs = format!(
                            " gml:id=\"{}.{}.{}\" srsName=\"{}\"",
                            sub.feature_type.name,
                            pk,
                            gml_seq,
                            xml_escape(&sub.projection.output_crs.to_string())
                        );
                        let transformed = sub.projection.output_crs.apply_to(geometry)?;
                        format!(
                            "<{qname}>{}</{qname}>",
                            render_gml_kind(
                                &transformed.kind,
                                &sub.projection.output_crs,
                                &base_attrs,
                                self.ctx.config.coordinate_precision
                            )
                        )
                    }
                    None => format!("<{qname} xsi:nil=\"true\"/>"),
                };
                out.write("<wfs:member>");
                out.write(&inner);
                out.write("</wfs:member>\n");
            } else {
                // Scalar (or array: one member per entry).
                if values.is_empty() {
                    out.write(&format!("<wfs:member><{qname} xsi:nil=\"true\"/></wfs:member>\n"));
                }
                for value in values {
                    match value {
                        FieldValue::Scalar(ScalarValue::Null) => {
                            out.write(&format!(
                                "<wfs:member><{qname} xsi:nil=\"true\"/></wfs:member>\n"
                            ));
                        }
                        FieldValue::Scalar(scalar) => {
                            let text = match scalar {
                                ScalarValue::String(s) => xml_escape(s),
                                other => scalar_to_xml_text(other),
                            };
                            out.write(&format!(
                                "<wfs:member><{qname}>{text}</{qname}></wfs:member>\n"
                            ));
                        }
                        _ => {}
                    }
                }
            }
            out.maybe_flush().await?;
        }

        out.write("</wfs:ValueCollection>\n");
        out.flush().await?;
        Ok(())
    }
}
