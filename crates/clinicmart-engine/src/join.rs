//! Left-outer join engine.

use std::collections::{BTreeMap, HashMap};

use clinicmart_types::{Table, Value};
use indexmap::IndexMap;

use crate::config::types::JoinPlan;
use crate::errors::PipelineError;

/// Join the plan's base table with each step's table, left to right.
///
/// # Errors
///
/// Returns `InvalidPlan` when the base or a step table was not extracted.
pub fn join(tables: &BTreeMap<String, Table>, plan: &JoinPlan) -> Result<Table, PipelineError> {
    let mut result = tables
        .get(&plan.base)
        .cloned()
        .ok_or_else(|| PipelineError::InvalidPlan(format!("join base '{}' was not extracted", plan.base)))?;

    for step in &plan.steps {
        let right = tables.get(&step.table).ok_or_else(|| {
            PipelineError::InvalidPlan(format!("join table '{}' was not extracted", step.table))
        })?;
        let before = result.len();
        result = left_outer(&result, right, &step.left, step.right_key());
        tracing::debug!(
            table = %step.table,
            left_key = %step.left,
            right_key = step.right_key(),
            rows_before = before,
            rows_after = result.len(),
            "joined"
        );
    }

    Ok(result)
}

/// Left-outer join on `left.left_key == right.right_key`.
///
/// Every left row appears at least once: once per matching right row, or
/// once with the right columns null. Null keys never match. When both keys
/// share a name the key column appears once; a right column whose name the
/// left table already uses is renamed `<column>_<right table>`.
#[must_use]
pub fn left_outer(left: &Table, right: &Table, left_key: &str, right_key: &str) -> Table {
    let mapped: Vec<(&str, String)> = right
        .columns()
        .iter()
        .filter(|c| !(c.as_str() == right_key && left_key == right_key))
        .map(|c| {
            let out = if left.has_column(c) {
                format!("{c}_{}", right.name())
            } else {
                c.clone()
            };
            (c.as_str(), out)
        })
        .collect();

    let mut index: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, row) in right.rows().iter().enumerate() {
        if let Some(key) = row.get(right_key).join_key() {
            index.entry(key).or_default().push(i);
        }
    }

    let mut columns = left.columns().to_vec();
    columns.extend(mapped.iter().map(|(_, out)| out.clone()));
    let mut joined = Table::new(left.name(), columns);

    for row in left.rows() {
        let matches = row
            .get(left_key)
            .join_key()
            .and_then(|key| index.get(&key))
            .map_or(&[][..], Vec::as_slice);

        if matches.is_empty() {
            let mut out = row.clone();
            for (_, name) in &mapped {
                out.set(name.as_str(), Value::Null);
            }
            joined.push(out);
            continue;
        }
        for &i in matches {
            let right_row = &right.rows()[i];
            let mut out = row.clone();
            for (source, name) in &mapped {
                out.set(name.as_str(), right_row.get(source).clone());
            }
            joined.push(out);
        }
    }

    joined
}

/// Apply `from → to` renames in order. Absent columns are skipped.
/// Returns how many renames took effect.
pub fn apply_renames(table: &mut Table, renames: &IndexMap<String, String>) -> usize {
    renames
        .iter()
        .filter(|(from, to)| table.rename_column(from, to))
        .count()
}

/// Rename sources that a join collision made ambiguous: `from` is the
/// leftmost table's column while a joined table's copy sits under
/// `<from>_<step table>`.
#[must_use]
pub fn ambiguous_renames<'a>(
    table: &Table,
    renames: &'a IndexMap<String, String>,
    plan: &JoinPlan,
) -> Vec<&'a str> {
    renames
        .keys()
        .filter(|from| {
            table.has_column(from)
                && plan
                    .steps
                    .iter()
                    .any(|step| table.has_column(&format!("{from}_{}", step.table)))
        })
        .map(String::as_str)
        .collect()
}
