//! The CSV renderer.
//!
//! Unbounded elements (arrays come through joined, relations are dropped)
//! don't fit a flat table; complex elements expand into dotted columns.
//! Geometries render as WKT in the output CRS.

use crate::buffer::{spawn_chunk_stream, ChunkWriter};
use crate::gml32::StreamError;
use crate::utils::{content_disposition, scalar_to_xml_text, to_wkt};
use crate::RenderContext;
use bytes::Bytes;
use futures::Stream;
use meridian_core::error::Result;
use meridian_core::values::ScalarValue;
use meridian_query::{FeatureCollection, FieldValue, Record, SimpleFeatureCollection};
use meridian_schema::{NodeId, NodeKind};

/// Fast CSV renderer over a stream response.
pub struct CsvRenderer {
    pub ctx: RenderContext,
    pub collection: FeatureCollection,
}

impl CsvRenderer {
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
            true,
            &type_names,
            start,
            limit,
            &self.collection.timestamp,
            "csv",
        )
    }

    /// Drop the columns CSV can't represent. Call before streaming.
    pub fn prepare(collection: &mut FeatureCollection) {
        for sub in &mut collection.results {
            sub.projection.remove_elements(|node| {
                (node.is_many() && node.is_complex())
                    || matches!(node.kind, NodeKind::GmlName | NodeKind::GmlBoundedBy)
            });
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Bytes> + Send {
        let chunk_size = self.ctx.config.chunk_size;
        spawn_chunk_stream(chunk_size, move |mut out| async move {
            if let Err(StreamError::Wfs(error)) = self.render(&mut out).await {
                tracing::error!(error = %error, "CSV rendering aborted mid-stream");
                out.write(&format!("\n\n# {error}\n"));
                let _ = out.finish().await;
            }
        })
    }

    async fn render(&self, out: &mut ChunkWriter) -> std::result::Result<(), StreamError> {
        let mut first_collection = true;
        for sub in &self.collection.results {
            if !first_collection {
                // Multiple feature types requested; a blank line keeps
                // the tables apart.
                out.write("\n\n");
            }
            first_collection = false;

            let columns = collect_columns(sub);
            let header: Vec<String> = std::iter::once("id".to_string())
                .chain(columns.iter().map(|c| c.title.clone()))
                .collect();
            out.write(&csv_row(&header));

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
                .await?;
            while let Some(chunk) = cursor.next_chunk().await? {
                for record in chunk {
                    let row = render_row(sub, &record, &columns)?;
                    out.write(&csv_row(&row));
                    out.maybe_flush().await?;
                }
            }
        }
        out.flush().await?;
        Ok(())
    }
}

struct Column {
    title: String,
    node: NodeId,
    /// For expanded complex types: the child to read within the relation.
    child: Option<NodeId>,
}

fn collect_columns(sub: &SimpleFeatureCollection) -> Vec<Column> {
    let mut columns = Vec::new();
    for id in sub.projection.root_elements() {
        let node = sub.projection.node(*id);
        if node.is_complex() {
            for child_id in sub.projection.child_nodes(*id) {
                let child = sub.projection.node(*child_id);
                columns.push(Column {
                    title: format!("{}.{}", node.name, child.name),
                    node: *id,
                    child: Some(*child_id),
                });
            }
        } else {
            columns.push(Column {
                title: node.name.clone(),
                node: *id,
                child: None,
            });
        }
    }
    columns
}

fn render_row(
    sub: &SimpleFeatureCollection,
    record: &Record,
    columns: &[Column],
) -> Result<Vec<String>> {
    let mut row = vec![record.scalar_at(sub.feature_type.id_path()).to_string()];
    for column in columns {
        let node = sub.projection.node(column.child.unwrap_or(column.node));
        let Some(path) = &node.source_path else {
            row.push(String::new());
            continue;
        };

        if node.is_geometry() {
            // Prefer the backend's pre-rendered WKT annotation.
            let annotation = format!("_as_wkt_{}", path.replace('.', "_"));
            if let Some(wkt) = record.annotation(&annotation) {
                row.push(wkt.to_string());
            } else {
                match record.geometry_at(path) {
                    Some(geometry) => {
                        let transformed = sub.projection.output_crs.apply_to(geometry)?;
                        row.push(to_wkt(&transformed.kind));
                    }
                    None => row.push(String::new()),
                }
            }
            continue;
        }

        let values = record.resolve_path(path);
        if node.is_many() {
            // Array values join into one cell.
            let joined = values
                .iter()
                .filter_map(|v| v.as_scalar())
                .map(scalar_to_xml_text)
                .collect::<Vec<_>>()
                .join(",");
            row.push(joined);
        } else {
            match values.first() {
                Some(FieldValue::Scalar(ScalarValue::Null)) | None => row.push(String::new()),
                Some(FieldValue::Scalar(scalar)) => row.push(scalar_to_xml_text(scalar)),
                Some(_) => row.push(String::new()),
            }
        }
    }
    Ok(row)
}

/// Quote fields per the common "unix" CSV dialect: quote when the value
/// contains a delimiter, quote or newline; double embedded quotes.
fn csv_row(fields: &[String]) -> String {
    let mut line = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        if field.contains(',') || field.contains('"') || field.contains('\n') {
            line.push('"');
            line.push_str(&field.replace('"', "\"\""));
            line.push('"');
        } else {
            line.push_str(field);
        }
    }
    line.push('\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_quoting() {
        assert_eq!(
            csv_row(&["a".into(), "b,c".into(), "d\"e".into()]),
            "a,\"b,c\",\"d\"\"e\"\n"
        );
    }
}
