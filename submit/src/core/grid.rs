//! Argument grid: effective argument table and Cartesian expansion.
//!
//! The effective table starts from a script's `default_args`; any argument
//! present in the overrides has its whole sequence replaced. Expansion walks
//! the product in table order with the last argument varying fastest, so the
//! same table always yields the same sequence of instances.

use indexmap::IndexMap;

use crate::core::config::{ModeConfig, ScriptEntry};
use crate::core::value::{ArgValue, coerce};
use crate::error::SubmitError;

/// Raw command-line overrides: argument name -> literal values, in order.
pub type ArgumentOverrides = IndexMap<String, Vec<String>>;

/// One candidate value in the effective table.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Value(ArgValue),
    /// An override literal that could not take the shape of its default.
    Rejected { raw: String, expected: String },
}

impl Cell {
    pub fn label(&self) -> String {
        match self {
            Cell::Value(value) => value.to_string(),
            Cell::Rejected { raw, .. } => raw.clone(),
        }
    }
}

/// Merged defaults and overrides for one script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectiveTable {
    columns: IndexMap<String, Vec<Cell>>,
}

impl EffectiveTable {
    pub fn build(script: &ScriptEntry, overrides: &ArgumentOverrides) -> Self {
        let mut columns = IndexMap::with_capacity(script.default_args.len() + overrides.len());
        for (name, defaults) in &script.default_args {
            let cells = match overrides.get(name) {
                Some(raw) => raw
                    .iter()
                    .map(|literal| coerce_cell(name, literal, Some(defaults.as_slice())))
                    .collect(),
                None => defaults.iter().cloned().map(Cell::Value).collect(),
            };
            columns.insert(name.clone(), cells);
        }
        for (name, raw) in overrides {
            if columns.contains_key(name) {
                continue;
            }
            let cells = raw
                .iter()
                .map(|literal| coerce_cell(name, literal, None))
                .collect();
            columns.insert(name.clone(), cells);
        }
        Self { columns }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[Cell])> {
        self.columns
            .iter()
            .map(|(name, cells)| (name.as_str(), cells.as_slice()))
    }

    /// Number of instances the table expands to, or `None` on overflow.
    ///
    /// An empty table still yields one instance.
    pub fn size(&self) -> Option<usize> {
        self.columns
            .values()
            .try_fold(1usize, |acc, cells| acc.checked_mul(cells.len()))
    }
}

fn coerce_cell(name: &str, literal: &str, defaults: Option<&[ArgValue]>) -> Cell {
    match coerce(name, literal, defaults) {
        Ok(value) => Cell::Value(value),
        Err(SubmitError::InvalidArgumentValue { expected, .. }) => Cell::Rejected {
            raw: literal.to_string(),
            expected,
        },
        Err(other) => Cell::Rejected {
            raw: literal.to_string(),
            expected: other.to_string(),
        },
    }
}

/// One concrete point of the grid, bound to its script and mode.
#[derive(Debug, Clone, PartialEq)]
pub struct JobInstance<'a> {
    /// Position in grid enumeration order (0-based).
    pub index: usize,
    pub args: IndexMap<String, ArgValue>,
    pub script: &'a ScriptEntry,
    pub mode: &'a ModeConfig,
}

impl JobInstance<'_> {
    pub fn labels(&self) -> Vec<(String, String)> {
        self.args
            .iter()
            .map(|(name, value)| (name.clone(), value.to_string()))
            .collect()
    }
}

/// A grid point that cannot be rendered because one of its values was rejected.
#[derive(Debug)]
pub struct RejectedInstance {
    pub index: usize,
    pub labels: Vec<(String, String)>,
    pub error: SubmitError,
}

#[derive(Debug)]
pub enum GridPoint<'a> {
    Ready(JobInstance<'a>),
    Rejected(RejectedInstance),
}

impl GridPoint<'_> {
    pub fn index(&self) -> usize {
        match self {
            GridPoint::Ready(instance) => instance.index,
            GridPoint::Rejected(rejected) => rejected.index,
        }
    }

    pub fn labels(&self) -> Vec<(String, String)> {
        match self {
            GridPoint::Ready(instance) => instance.labels(),
            GridPoint::Rejected(rejected) => rejected.labels.clone(),
        }
    }
}

/// Enumerate the Cartesian product of `table` in deterministic order.
///
/// The expansion itself does not cap the number of points; callers apply
/// their own policy on [`EffectiveTable::size`] first. A table whose size
/// overflows `usize` expands to nothing.
pub fn expand<'a>(
    table: &EffectiveTable,
    script: &'a ScriptEntry,
    mode: &'a ModeConfig,
) -> Vec<GridPoint<'a>> {
    let columns: Vec<(&String, &Vec<Cell>)> = table.columns.iter().collect();
    let Some(total) = table.size() else {
        return Vec::new();
    };
    let mut points = Vec::with_capacity(total.min(4096));
    let mut cursor = vec![0usize; columns.len()];

    for index in 0..total {
        let mut args = IndexMap::with_capacity(columns.len());
        let mut labels = Vec::with_capacity(columns.len());
        let mut error = None;
        for (pos, (name, cells)) in columns.iter().enumerate() {
            let cell = &cells[cursor[pos]];
            labels.push(((*name).clone(), cell.label()));
            match cell {
                Cell::Value(value) => {
                    args.insert((*name).clone(), value.clone());
                }
                Cell::Rejected { raw, expected } => {
                    if error.is_none() {
                        error = Some(SubmitError::InvalidArgumentValue {
                            name: (*name).clone(),
                            value: raw.clone(),
                            expected: expected.clone(),
                        });
                    }
                }
            }
        }

        points.push(match error {
            Some(error) => GridPoint::Rejected(RejectedInstance {
                index,
                labels,
                error,
            }),
            None => GridPoint::Ready(JobInstance {
                index,
                args,
                script,
                mode,
            }),
        });

        for pos in (0..columns.len()).rev() {
            cursor[pos] += 1;
            if cursor[pos] < columns[pos].1.len() {
                break;
            }
            cursor[pos] = 0;
        }
    }

    points
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::PathBuf;

    use super::*;
    use crate::core::config::Backend;
    use crate::core::value::NumberLiteral;
    use serde_json::Number;

    fn float(v: f64) -> ArgValue {
        ArgValue::Number(NumberLiteral::from(Number::from_f64(v).expect("finite")))
    }

    fn script(defaults: Vec<(&str, Vec<ArgValue>)>) -> ScriptEntry {
        ScriptEntry {
            name: "train".to_string(),
            path: PathBuf::from("train.py"),
            default_args: defaults
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    fn mode() -> ModeConfig {
        ModeConfig {
            name: "local".to_string(),
            pykernel: "python".to_string(),
            template: PathBuf::from("local.sh.j2"),
            backend: Backend::Local,
            shell: "bash".to_string(),
            submit_command: "sbatch".to_string(),
        }
    }

    fn overrides(pairs: &[(&str, &[&str])]) -> ArgumentOverrides {
        pairs
            .iter()
            .map(|(k, vals)| (k.to_string(), vals.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    fn ready<'a>(points: &'a [GridPoint<'a>]) -> Vec<&'a JobInstance<'a>> {
        points
            .iter()
            .filter_map(|p| match p {
                GridPoint::Ready(instance) => Some(instance),
                GridPoint::Rejected(_) => None,
            })
            .collect()
    }

    #[test]
    fn example_scenario_orders_last_key_fastest() {
        let script = script(vec![("lr", vec![float(0.1), float(0.01)])]);
        let mode = mode();
        let table = EffectiveTable::build(&script, &overrides(&[("seed", &["1", "2"])]));
        let points = expand(&table, &script, &mode);

        let tuples: Vec<Vec<(String, String)>> = points.iter().map(GridPoint::labels).collect();
        let expected = [("0.1", "1"), ("0.1", "2"), ("0.01", "1"), ("0.01", "2")];
        assert_eq!(tuples.len(), expected.len());
        for (tuple, (lr, seed)) in tuples.iter().zip(expected) {
            assert_eq!(
                tuple,
                &vec![
                    ("lr".to_string(), lr.to_string()),
                    ("seed".to_string(), seed.to_string())
                ]
            );
        }
        let indices: Vec<usize> = points.iter().map(GridPoint::index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn instance_count_is_product_of_cardinalities() {
        let mode = mode();
        for dims in [vec![1], vec![3, 4], vec![2, 3, 4], vec![4, 1, 4]] {
            let script = script(Vec::new());
            let mut ov = ArgumentOverrides::new();
            for (i, n) in dims.iter().enumerate() {
                ov.insert(format!("k{i}"), (0..*n).map(|v| v.to_string()).collect());
            }
            let table = EffectiveTable::build(&script, &ov);
            let points = expand(&table, &script, &mode);
            let expected: usize = dims.iter().product();
            assert_eq!(table.size(), Some(expected));
            assert_eq!(points.len(), expected);

            let distinct: HashSet<Vec<(String, String)>> =
                points.iter().map(GridPoint::labels).collect();
            assert_eq!(distinct.len(), expected, "no duplicates for {dims:?}");
        }
    }

    #[test]
    fn override_replaces_default_entirely() {
        let script = script(vec![("a", vec![ArgValue::from(1), ArgValue::from(2)])]);
        let mode = mode();
        let table = EffectiveTable::build(&script, &overrides(&[("a", &["9"])]));
        let points = expand(&table, &script, &mode);
        let instances = ready(&points);
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].args["a"], ArgValue::from(9));
    }

    #[test]
    fn override_keeps_default_position() {
        let script = script(vec![
            ("a", vec![ArgValue::from(1)]),
            ("b", vec![ArgValue::from(2)]),
        ]);
        let table = EffectiveTable::build(&script, &overrides(&[("c", &["3"]), ("a", &["5"])]));
        let names: Vec<&str> = table.columns().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn empty_table_yields_one_empty_instance() {
        let script = script(Vec::new());
        let mode = mode();
        let table = EffectiveTable::build(&script, &ArgumentOverrides::new());
        assert!(table.is_empty());
        let points = expand(&table, &script, &mode);
        let instances = ready(&points);
        assert_eq!(instances.len(), 1);
        assert!(instances[0].args.is_empty());
    }

    #[test]
    fn rejected_values_only_affect_their_instances() {
        let script = script(vec![("lr", vec![float(0.1)])]);
        let mode = mode();
        let table = EffectiveTable::build(&script, &overrides(&[("lr", &["0.5", "abc", "0.3"])]));
        let points = expand(&table, &script, &mode);
        assert_eq!(points.len(), 3);
        assert!(matches!(points[0], GridPoint::Ready(_)));
        match &points[1] {
            GridPoint::Rejected(rejected) => {
                assert_eq!(rejected.index, 1);
                assert_eq!(rejected.labels, vec![("lr".to_string(), "abc".to_string())]);
                assert!(matches!(
                    rejected.error,
                    SubmitError::InvalidArgumentValue { ref name, .. } if name == "lr"
                ));
            }
            GridPoint::Ready(_) => panic!("expected rejected instance"),
        }
        assert!(matches!(points[2], GridPoint::Ready(_)));
    }

    #[test]
    fn expansion_is_deterministic() {
        let script = script(vec![("x", vec![ArgValue::from(1), ArgValue::from(2)])]);
        let mode = mode();
        let ov = overrides(&[("y", &["a", "b", "c"])]);
        let first: Vec<_> = expand(&EffectiveTable::build(&script, &ov), &script, &mode)
            .iter()
            .map(GridPoint::labels)
            .collect();
        let second: Vec<_> = expand(&EffectiveTable::build(&script, &ov), &script, &mode)
            .iter()
            .map(GridPoint::labels)
            .collect();
        assert_eq!(first, second);
    }
}
