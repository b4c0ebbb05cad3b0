//! Program executor
//!
//! Runs a compiled [`Program`] against a source document and builds the target
//! document. Semantics follow the generated JavaScript routine: a missing key reads
//! as "undefined", assigning undefined leaves the key out, and only null or
//! undefined trigger a rule's default.

use serde_json::{Map, Value};
use std::collections::HashMap;

use super::ast::{Expr, Scope};
use super::functions::Function;
use super::path::PropertyPath;
use super::program::{Base, LoopMode, Place, Program, Stmt};
use crate::error::{ExecError, ExecResult};

/// Execute `program` against `source` and return the new target document.
pub fn execute(program: &Program, source: &Value) -> ExecResult<Value> {
    let mut machine = Machine::new(program, source);
    let mut target = Value::Object(Map::new());
    let mut element = None;
    for stmt in &program.body {
        machine.exec(stmt, &mut target, &mut element, None)?;
    }
    Ok(target)
}

/// Execute `program` against each document in turn.
pub fn execute_all(program: &Program, sources: &[Value]) -> ExecResult<Vec<Value>> {
    sources.iter().map(|source| execute(program, source)).collect()
}

struct Machine<'a> {
    source: &'a Value,
    helpers: HashMap<&'a str, Function>,
    enums: HashMap<&'a str, &'a [Value]>,
}

impl<'a> Machine<'a> {
    fn new(program: &'a Program, source: &'a Value) -> Self {
        let helpers = program
            .helpers
            .iter()
            .map(|h| (h.name.as_str(), h.function))
            .collect();
        Self {
            source,
            helpers,
            enums: HashMap::new(),
        }
    }

    fn exec(
        &mut self,
        stmt: &'a Stmt,
        target: &mut Value,
        element: &mut Option<Value>,
        item: Option<&Value>,
    ) -> ExecResult<()> {
        match stmt {
            Stmt::DeclareEnum { name, values } => {
                self.enums.insert(name.as_str(), values.as_slice());
            }
            Stmt::Guard { place } => {
                let base = base_mut(place.base, target, element)?;
                ensure_object(base, &place.path)?;
            }
            Stmt::InitArray { path } => {
                write(target, path, Value::Array(Vec::new()))?;
            }
            Stmt::Assign {
                place,
                value,
                default,
            } => {
                let resolved = match self.eval(value, item)? {
                    Some(v) if !v.is_null() => Some(v),
                    other => default.clone().or(other),
                };
                // A whole element assigned nothing still occupies its slot.
                let resolved = match (resolved, place.base) {
                    (None, Base::Element) if place.path.is_empty() => Some(Value::Null),
                    (resolved, _) => resolved,
                };
                if let Some(v) = resolved {
                    write(base_mut(place.base, target, element)?, &place.path, v)?;
                }
            }
            Stmt::Loop {
                source,
                target: array,
                mode,
                body,
            } => {
                if element.is_some() {
                    return Err(ExecError::InvalidProgram(
                        "nested loops are not supported".to_string(),
                    ));
                }
                self.run_loop(source, array, *mode, body, target)?;
            }
        }
        Ok(())
    }

    fn run_loop(
        &mut self,
        source: &PropertyPath,
        array: &PropertyPath,
        mode: LoopMode,
        body: &'a [Stmt],
        target: &mut Value,
    ) -> ExecResult<()> {
        let items = lookup(self.source, source)
            .and_then(Value::as_array)
            .ok_or_else(|| ExecError::NotAnArray(source.to_string()))?;

        for (i, item) in items.iter().enumerate() {
            let mut element = Some(match mode {
                LoopMode::Append => Value::Object(Map::new()),
                LoopMode::Merge => take_element(target, array, i)?,
            });
            for stmt in body {
                self.exec(stmt, target, &mut element, Some(item))?;
            }
            let built = element.take().unwrap_or(Value::Null);
            let slots = array_mut(target, array)?;
            match mode {
                LoopMode::Append => slots.push(built),
                LoopMode::Merge => store_element(slots, i, built),
            }
        }
        Ok(())
    }

    fn eval(&self, expr: &Expr, item: Option<&Value>) -> ExecResult<Option<Value>> {
        match expr {
            Expr::Literal { value } => Ok(Some(value.clone())),
            Expr::Path { scope, path } => {
                Ok(lookup(self.root(*scope, item)?, path).cloned())
            }
            Expr::Spread { .. } => {
                let mut values = Vec::new();
                self.spread_into(expr, item, &mut values)?;
                // Undefined array entries serialize as null.
                let values = values.into_iter().map(Option::unwrap_or_default).collect();
                Ok(Some(Value::Array(values)))
            }
            Expr::Call { name, args } => {
                let function = self
                    .helpers
                    .get(name.as_str())
                    .ok_or_else(|| ExecError::UnresolvedCall(name.clone()))?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    if matches!(arg, Expr::Spread { .. }) {
                        self.spread_into(arg, item, &mut values)?;
                    } else {
                        values.push(self.eval(arg, item)?);
                    }
                }
                Ok(function.apply(&values))
            }
            Expr::EnumLookup { table, index } => {
                let values = self
                    .enums
                    .get(table.as_str())
                    .ok_or_else(|| ExecError::UnknownEnum(table.clone()))?;
                let index = self.eval(index, item)?.unwrap_or(Value::Null);
                let position = enum_position(&index).filter(|i| *i < values.len());
                match position {
                    Some(i) => Ok(Some(values[i].clone())),
                    None => Err(ExecError::EnumIndex {
                        table: table.clone(),
                        index: index.to_string(),
                        len: values.len(),
                    }),
                }
            }
        }
    }

    fn spread_into(
        &self,
        expr: &Expr,
        item: Option<&Value>,
        out: &mut Vec<Option<Value>>,
    ) -> ExecResult<()> {
        if let Expr::Spread {
            scope,
            array,
            item: field,
        } = expr
        {
            let elements = lookup(self.root(*scope, item)?, array)
                .and_then(Value::as_array)
                .ok_or_else(|| ExecError::NotAnArray(array.to_string()))?;
            out.extend(
                elements
                    .iter()
                    .map(|e| lookup(e, field).cloned()),
            );
        }
        Ok(())
    }

    fn root<'v>(&'v self, scope: Scope, item: Option<&'v Value>) -> ExecResult<&'v Value> {
        match scope {
            Scope::Source => Ok(self.source),
            Scope::Item => item.ok_or_else(|| {
                ExecError::InvalidProgram("element read outside a loop".to_string())
            }),
        }
    }
}

/// Position named by an enumeration index: a non-negative integer, or a string
/// holding one (JavaScript property keys are strings).
fn enum_position(index: &Value) -> Option<usize> {
    match index {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                usize::try_from(u).ok()
            } else {
                n.as_f64()
                    .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                    .map(|f| f as usize)
            }
        }
        Value::String(s) => {
            let canonical = s.parse::<usize>().ok()?;
            (canonical.to_string() == *s).then_some(canonical)
        }
        _ => None,
    }
}

fn base_mut<'v>(
    base: Base,
    target: &'v mut Value,
    element: &'v mut Option<Value>,
) -> ExecResult<&'v mut Value> {
    match base {
        Base::Target => Ok(target),
        Base::Element => element.as_mut().ok_or_else(|| {
            ExecError::InvalidProgram("element write outside a loop".to_string())
        }),
    }
}

/// Read `path` below `root`; `None` when any key is missing.
fn lookup<'v>(root: &'v Value, path: &PropertyPath) -> Option<&'v Value> {
    path.segments()
        .iter()
        .try_fold(root, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Walk to the object holding the last key of `path`.
fn parent_mut<'v>(
    root: &'v mut Value,
    path: &PropertyPath,
) -> ExecResult<Option<(&'v mut Map<String, Value>, String)>> {
    let Some((parent, key)) = path.split_last() else {
        return Ok(None);
    };
    let mut current = root;
    for segment in parent.segments() {
        current = current
            .as_object_mut()
            .and_then(|map| map.get_mut(segment))
            .ok_or_else(|| ExecError::NotAnObject(path.to_string()))?;
    }
    let map = current
        .as_object_mut()
        .ok_or_else(|| ExecError::NotAnObject(path.to_string()))?;
    Ok(Some((map, key.to_string())))
}

fn write(root: &mut Value, path: &PropertyPath, value: Value) -> ExecResult<()> {
    match parent_mut(root, path)? {
        Some((map, key)) => {
            map.insert(key, value);
        }
        None => *root = value,
    }
    Ok(())
}

fn ensure_object(root: &mut Value, path: &PropertyPath) -> ExecResult<()> {
    if let Some((map, key)) = parent_mut(root, path)? {
        let slot = map.entry(key).or_insert(Value::Null);
        if slot.is_null() {
            *slot = Value::Object(Map::new());
        }
    }
    Ok(())
}

fn lookup_mut<'v>(root: &'v mut Value, path: &PropertyPath) -> Option<&'v mut Value> {
    path.segments()
        .iter()
        .try_fold(root, |current, segment| current.as_object_mut()?.get_mut(segment))
}

fn array_mut<'v>(target: &'v mut Value, path: &PropertyPath) -> ExecResult<&'v mut Vec<Value>> {
    lookup_mut(target, path)
        .and_then(Value::as_array_mut)
        .ok_or_else(|| ExecError::NotAnArray(path.to_string()))
}

/// Take the element at `index` out of the target array, creating it if absent.
fn take_element(target: &mut Value, path: &PropertyPath, index: usize) -> ExecResult<Value> {
    let slots = array_mut(target, path)?;
    if slots.len() <= index {
        slots.resize(index + 1, Value::Null);
    }
    Ok(match std::mem::take(&mut slots[index]) {
        Value::Null => Value::Object(Map::new()),
        existing => existing,
    })
}

/// Put a merged element back at `index`. A body that re-created the array leaves
/// it shorter; the gap is padded with nulls like a sparse JavaScript array.
fn store_element(slots: &mut Vec<Value>, index: usize, element: Value) {
    if slots.len() <= index {
        slots.resize(index + 1, Value::Null);
    }
    slots[index] = element;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::functions::FunctionRegistry;
    use crate::compiler::generator::compile;
    use crate::compiler::javascript::render;
    use crate::compiler::program::Helper;
    use crate::rules::Rule;
    use serde_json::json;

    fn run(rules: &[Rule], source: Value) -> ExecResult<Value> {
        let program = compile(rules, &FunctionRegistry::builtin()).unwrap();
        execute(&program, &source)
    }

    #[test]
    fn test_end_to_end_scenario() {
        let result = run(
            &[
                Rule::new("name", ".firstName"),
                Rule::new("tags.^item", ".labels.^item"),
            ],
            json!({"firstName": "Ann", "labels": ["a", "b"]}),
        )
        .unwrap();
        assert_eq!(result, json!({"name": "Ann", "tags": ["a", "b"]}));
    }

    #[test]
    fn test_pass_through_paths() {
        let source = json!({
            "customer": {"address": {"city": "Lyon", "zip": "69001"}, "vip": true},
            "count": 3
        });
        let result = run(
            &[
                Rule::new("client.town", ".customer.address.city"),
                Rule::new("client.postcode", ".customer.address.zip"),
                Rule::new("client.flags.vip", ".customer.vip"),
                Rule::new("n", ".count"),
                Rule::new("copy", ".customer.address"),
            ],
            source,
        )
        .unwrap();
        assert_eq!(
            result,
            json!({
                "client": {"town": "Lyon", "postcode": "69001", "flags": {"vip": true}},
                "n": 3,
                "copy": {"city": "Lyon", "zip": "69001"}
            })
        );
    }

    #[test]
    fn test_default_only_for_null_or_missing() {
        let rules = [
            Rule::new("missing", ".nope").with_default("\"fallback\""),
            Rule::new("null", ".nothing").with_default("\"fallback\""),
            Rule::new("zero", ".zero").with_default("99"),
            Rule::new("no", ".no").with_default("true"),
            Rule::new("empty", ".empty").with_default("\"fallback\""),
            Rule::new("present", ".name").with_default("\"fallback\""),
        ];
        let result = run(
            &rules,
            json!({"nothing": null, "zero": 0, "no": false, "empty": "", "name": "Ann"}),
        )
        .unwrap();
        assert_eq!(
            result,
            json!({
                "missing": "fallback",
                "null": "fallback",
                "zero": 0,
                "no": false,
                "empty": "",
                "present": "Ann"
            })
        );
    }

    #[test]
    fn test_missing_source_without_default_leaves_key_out() {
        let result = run(
            &[Rule::new("a", ".missing"), Rule::new("b", ".present")],
            json!({"present": null}),
        )
        .unwrap();
        assert_eq!(result, json!({"b": null}));
    }

    #[test]
    fn test_literal_sources() {
        let result = run(
            &[
                Rule::new("kind", "\"invoice\""),
                Rule::new("version", "2"),
                Rule::new("label", "plain text"),
            ],
            json!({}),
        )
        .unwrap();
        assert_eq!(result, json!({"kind": "invoice", "version": 2, "label": "plain text"}));
    }

    #[test]
    fn test_enum_lookup() {
        let rules = [Rule::new("colour", "$ENUM(.colourIndex)")
            .with_enumeration(r#"["red","green","blue"]"#)];
        let result = run(&rules, json!({"colourIndex": 1})).unwrap();
        assert_eq!(result, json!({"colour": "green"}));

        let result = run(&rules, json!({"colourIndex": "2"})).unwrap();
        assert_eq!(result, json!({"colour": "blue"}));
    }

    #[test]
    fn test_enum_index_out_of_range() {
        let rules = [Rule::new("colour", "$ENUM(.i)").with_enumeration(r#"["red"]"#)];
        for bad in [json!({"i": 1}), json!({"i": -1}), json!({"i": 0.5}), json!({})] {
            let err = run(&rules, bad).unwrap_err();
            assert!(matches!(err, ExecError::EnumIndex { len: 1, .. }), "{:?}", err);
        }
    }

    #[test]
    fn test_enum_with_computed_index_and_default() {
        let rules = [Rule::new("size", "$ENUM($SUBTRACT(.code, 1))")
            .with_enumeration(r#"["S", null, "L"]"#)
            .with_default("\"M\"")];
        assert_eq!(run(&rules, json!({"code": 1})).unwrap(), json!({"size": "S"}));
        assert_eq!(run(&rules, json!({"code": 2})).unwrap(), json!({"size": "M"}));
    }

    #[test]
    fn test_nested_calls() {
        let result = run(
            &[
                Rule::new("total", "$ADD($MULTIPLY(.price, .qty), .shipping)"),
                Rule::new("name", "$JOIN(.first, \", \", .last)"),
                Rule::new("tier", "$IF(.vip, \"gold\", \"basic\")"),
            ],
            json!({"price": 2.5, "qty": 4, "shipping": "5", "first": "Lovelace", "last": "Ada", "vip": false}),
        )
        .unwrap();
        assert_eq!(result, json!({"total": 15, "name": "Lovelace, Ada", "tier": "basic"}));
    }

    #[test]
    fn test_spread_flattens_into_call() {
        let result = run(
            &[
                Rule::new("total", "$ADD(.lines.^item.price, .tip)"),
                Rule::new("prices", ".lines.^item.price"),
            ],
            json!({"lines": [{"price": 1}, {"price": 2}, {"price": 3}], "tip": 10}),
        )
        .unwrap();
        assert_eq!(result, json!({"total": 16, "prices": [1, 2, 3]}));
    }

    #[test]
    fn test_array_length_and_fields() {
        let source = json!({"items": [
            {"code": "A1", "price": 2, "qty": 3},
            {"code": "B2", "price": 5, "qty": 1}
        ]});
        let result = run(
            &[
                Rule::new("order.lines.^item.sku", ".items.^item.code"),
                Rule::new("order.lines.^item.amount", "$MULTIPLY(.items.^item.price, .items.^item.qty)"),
                Rule::new("order.lines.^item.meta.origin", "$JOIN(\"import-\", .items.^item.code)"),
            ],
            source,
        )
        .unwrap();
        assert_eq!(
            result,
            json!({"order": {"lines": [
                {"sku": "A1", "amount": 6, "meta": {"origin": "import-A1"}},
                {"sku": "B2", "amount": 5, "meta": {"origin": "import-B2"}}
            ]}})
        );
    }

    #[test]
    fn test_empty_source_array() {
        let result = run(&[Rule::new("tags.^item", ".labels.^item")], json!({"labels": []})).unwrap();
        assert_eq!(result, json!({"tags": []}));
    }

    #[test]
    fn test_missing_driving_array() {
        let err = run(&[Rule::new("tags.^item", ".labels.^item")], json!({})).unwrap_err();
        assert_eq!(err, ExecError::NotAnArray("labels".into()));
    }

    #[test]
    fn test_merge_creates_missing_elements() {
        let result = run(
            &[
                Rule::new("rows.^item.a", ".short.^item"),
                Rule::new("rows.^item.b", ".long.^item"),
            ],
            json!({"short": [1], "long": [10, 20]}),
        )
        .unwrap();
        assert_eq!(result, json!({"rows": [{"a": 1, "b": 10}, {"b": 20}]}));
    }

    #[test]
    fn test_array_rule_default() {
        let result = run(
            &[Rule::new("people.^item.name", ".users.^item.name").with_default("\"anonymous\"")],
            json!({"users": [{"name": "Ann"}, {}]}),
        )
        .unwrap();
        assert_eq!(result, json!({"people": [{"name": "Ann"}, {"name": "anonymous"}]}));
    }

    #[test]
    fn test_unresolved_call() {
        let program = Program::from_json(
            r#"{"body": [{"op": "assign", "place": {"base": "target", "path": ["x"]},
                "value": {"type": "call", "name": "$ADD", "args": []}}]}"#,
        )
        .unwrap();
        let err = execute(&program, &json!({})).unwrap_err();
        assert_eq!(err, ExecError::UnresolvedCall("$ADD".into()));

        let mut fixed = program.clone();
        fixed.helpers.push(Helper { name: "$ADD".into(), function: Function::Add });
        assert_eq!(execute(&fixed, &json!({})).unwrap(), json!({"x": 0}));
    }

    #[test]
    fn test_write_through_scalar_fails() {
        let err = run(
            &[Rule::new("a", "1"), Rule::new("a.b", "2")],
            json!({}),
        )
        .unwrap_err();
        assert_eq!(err, ExecError::NotAnObject("a.b".into()));
    }

    #[test]
    fn test_missing_values_match_javascript() {
        // (rule, source document, rendered assignment, result of the rendered module)
        let cases = [
            (
                Rule::new("total", "$ADD(.missing, 1)"),
                json!({}),
                r#"final["total"] = $ADD(source?.["missing"], 1);"#,
                json!({"total": null}),
            ),
            (
                Rule::new("total", "$ADD(.nothing, 1)"),
                json!({"nothing": null}),
                r#"final["total"] = $ADD(source?.["nothing"], 1);"#,
                json!({"total": 1}),
            ),
            (
                Rule::new("m", "$MAX(.missing)"),
                json!({}),
                r#"final["m"] = $MAX(source?.["missing"]);"#,
                json!({"m": null}),
            ),
            (
                Rule::new("pick", "$IF(true, .missing, 1)"),
                json!({}),
                r#"final["pick"] = $IF(true, source?.["missing"], 1);"#,
                json!({}),
            ),
            (
                Rule::new("pick", "$IF(true, .missing, 1)").with_default("0"),
                json!({}),
                r#"final["pick"] = $IF(true, source?.["missing"], 1) ?? 0;"#,
                json!({"pick": 0}),
            ),
            (
                Rule::new("pick", "$IF(.missing, \"y\", \"n\")"),
                json!({}),
                r#"final["pick"] = $IF(source?.["missing"], "y", "n");"#,
                json!({"pick": "n"}),
            ),
            (
                Rule::new("s", "$ADD(.lines.^item.price)"),
                json!({"lines": [{"price": 1}, {}]}),
                r#"final["s"] = $ADD(...source?.["lines"].map((el) => el?.["price"]));"#,
                json!({"s": null}),
            ),
            (
                Rule::new("prices", ".lines.^item.price"),
                json!({"lines": [{"price": 1}, {}]}),
                r#"final["prices"] = source?.["lines"].map((el) => el?.["price"]);"#,
                json!({"prices": [1, null]}),
            ),
            (
                Rule::new("label", "$JOIN(.first, .missing, \"!\")"),
                json!({"first": "Ann"}),
                r#"final["label"] = $JOIN(source?.["first"], source?.["missing"], "!");"#,
                json!({"label": "Ann!"}),
            ),
        ];

        for (rule, source, assignment, expected) in cases {
            let program = compile(std::slice::from_ref(&rule), &FunctionRegistry::builtin()).unwrap();
            let js = render(&program);
            assert!(js.contains(assignment), "{}:\n{}", rule.source, js);
            assert_eq!(execute(&program, &source).unwrap(), expected, "{}", rule.source);
        }
    }

    #[test]
    fn test_merge_after_array_recreated_in_body() {
        // A hand-edited body resets the array; the element lands at its index
        // in the fresh array, with a null gap before it.
        let program = Program::from_json(
            r#"{"body": [
                {"op": "init_array", "path": ["rows"]},
                {"op": "loop", "source": ["xs"], "target": ["rows"], "mode": "merge",
                 "body": [{"op": "init_array", "path": ["rows"]}]}
            ]}"#,
        )
        .unwrap();
        let result = execute(&program, &json!({"xs": [1, 2]})).unwrap();
        assert_eq!(result, json!({"rows": [null, {}]}));
    }

    #[test]
    fn test_execute_all() {
        let program = compile(&[Rule::new("id", ".n")], &FunctionRegistry::builtin()).unwrap();
        let results = execute_all(&program, &[json!({"n": 1}), json!({"n": 2})]).unwrap();
        assert_eq!(results, vec![json!({"id": 1}), json!({"id": 2})]);
    }
}
