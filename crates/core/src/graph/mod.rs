//! Call graph construction and reachability-based dead-code analysis (§4.9).
//!
//! References carry names, not resolved ids (`Reference::to_symbol` may be
//! bare or `pkg.Name`-qualified) — resolving them into graph edges is this
//! module's job. Reachability walks forward from a set of per-language entry
//! points; anything never reached is dead, with a reason and a confidence
//! score that backs off for naming patterns that are often false positives
//! (exported API, constructor, interface-implementation candidate, handler).

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::RwLock;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::error::{IndexError, IndexResult};
use crate::types::{language_from_path, Language, Reference, Symbol, SymbolKind, Visibility};

/// Why a symbol was classified as dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadCodeReason {
    /// No reference resolves to this symbol at all.
    NoCallers,
    /// Has callers, but every one of them is itself dead.
    OnlyCalledByDeadCode,
    /// Dead for some other reason not covered by the two cases above.
    Unreachable,
}

impl DeadCodeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoCallers => "no callers found",
            Self::OnlyCalledByDeadCode => "only called by dead code",
            Self::Unreachable => "unreachable",
        }
    }
}

/// A symbol classified as dead code, with supporting evidence.
#[derive(Debug, Clone)]
pub struct DeadSymbol {
    pub symbol_id: String,
    pub name: String,
    pub file_path: String,
    pub reason: DeadCodeReason,
    pub confidence: f64,
}

struct GraphInner {
    graph: DiGraph<String, ()>,
    symbol_to_node: HashMap<String, NodeIndex>,
    /// Bare symbol name -> ids of every symbol with that name, for reference resolution.
    name_index: HashMap<String, Vec<String>>,
}

/// Resolved call graph over a symbol/reference set, built fresh for each
/// dead-code run (§4.9 is a point-in-time analysis, not an incrementally
/// maintained structure).
pub struct CallGraph {
    inner: RwLock<GraphInner>,
    symbols: HashMap<String, Symbol>,
}

impl CallGraph {
    fn empty() -> Self {
        Self {
            inner: RwLock::new(GraphInner {
                graph: DiGraph::new(),
                symbol_to_node: HashMap::new(),
                name_index: HashMap::new(),
            }),
            symbols: HashMap::new(),
        }
    }

    /// Build a call graph from every symbol and internal reference in the index.
    pub fn build(symbols: Vec<Symbol>, references: &[Reference]) -> IndexResult<Self> {
        let mut cg = Self::empty();
        {
            let mut inner = cg.inner.write().map_err(lock_poisoned)?;
            for s in &symbols {
                let idx = inner.graph.add_node(s.id.clone());
                inner.symbol_to_node.insert(s.id.clone(), idx);
                inner.name_index.entry(s.name.clone()).or_default().push(s.id.clone());
            }
        }
        for s in symbols {
            cg.symbols.insert(s.id.clone(), s);
        }

        for r in references {
            if r.is_external {
                continue;
            }
            let Some(caller_id) = cg.resolve_in_file(&r.from_symbol, &r.file_path) else {
                continue;
            };
            let Some(callee_id) = cg.resolve(&r.to_symbol, &r.file_path) else {
                continue;
            };
            if caller_id == callee_id {
                continue;
            }
            cg.add_edge(&caller_id, &callee_id)?;
        }

        Ok(cg)
    }

    fn add_edge(&self, from: &str, to: &str) -> IndexResult<()> {
        let mut inner = self.inner.write().map_err(lock_poisoned)?;
        let (Some(&from_idx), Some(&to_idx)) = (inner.symbol_to_node.get(from), inner.symbol_to_node.get(to)) else {
            return Ok(());
        };
        if inner.graph.find_edge(from_idx, to_idx).is_none() {
            inner.graph.add_edge(from_idx, to_idx, ());
        }
        Ok(())
    }

    /// Resolve a reference target name to a symbol id.
    ///
    /// Rules (§4.9): exact id match, then bare name (stripping any
    /// qualifier before the last `.`), preferring a candidate whose file
    /// shares a parent directory with `context_file` when more than one
    /// symbol shares that name. Unresolvable names (no candidate at all)
    /// are left as external.
    fn resolve(&self, raw: &str, context_file: &str) -> Option<String> {
        let inner = self.inner.read().ok()?;
        if inner.symbol_to_node.contains_key(raw) {
            return Some(raw.to_string());
        }
        let bare = raw.rsplit('.').next().unwrap_or(raw);
        let candidates = inner.name_index.get(bare)?;
        pick_candidate(candidates, context_file, &self.symbols)
    }

    /// Resolve a reference's *origin* name (almost always bare, since it is
    /// the enclosing function/method of the reference site) preferring a
    /// symbol defined in the same file.
    fn resolve_in_file(&self, raw: &str, context_file: &str) -> Option<String> {
        let inner = self.inner.read().ok()?;
        if inner.symbol_to_node.contains_key(raw) {
            return Some(raw.to_string());
        }
        let bare = raw.rsplit('.').next().unwrap_or(raw);
        let candidates = inner.name_index.get(bare)?;
        let same_file: Vec<String> = candidates
            .iter()
            .filter(|id| self.symbols.get(*id).is_some_and(|s| s.file_path == context_file))
            .cloned()
            .collect();
        if !same_file.is_empty() {
            return pick_candidate(&same_file, context_file, &self.symbols);
        }
        pick_candidate(candidates, context_file, &self.symbols)
    }

    /// Symbols reachable by BFS from every entry point, by id.
    fn reachable_set(&self) -> IndexResult<HashSet<NodeIndex>> {
        let inner = self.inner.read().map_err(lock_poisoned)?;
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        for (id, symbol) in &self.symbols {
            if is_entry_point(symbol) {
                if let Some(&idx) = inner.symbol_to_node.get(id) {
                    if visited.insert(idx) {
                        queue.push_back(idx);
                    }
                }
            }
        }
        while let Some(node) = queue.pop_front() {
            for neighbor in inner.graph.neighbors_directed(node, Direction::Outgoing) {
                if visited.insert(neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }
        Ok(visited)
    }

    /// Classify every unreached symbol, score confidence, drop anything
    /// below 0.5, and return the `limit` highest-confidence findings.
    pub fn dead_code(&self, limit: usize) -> IndexResult<Vec<DeadSymbol>> {
        let inner = self.inner.read().map_err(lock_poisoned)?;
        let reachable = self.reachable_set()?;

        let mut dead_nodes: HashSet<NodeIndex> = HashSet::new();
        for (id, &idx) in &inner.symbol_to_node {
            if !reachable.contains(&idx) && self.symbols.contains_key(id) {
                dead_nodes.insert(idx);
            }
        }

        let mut out = Vec::new();
        for &idx in &dead_nodes {
            let id = &inner.graph[idx];
            let Some(symbol) = self.symbols.get(id) else { continue };

            let predecessors: Vec<NodeIndex> = inner.graph.neighbors_directed(idx, Direction::Incoming).collect();
            let reason = if predecessors.is_empty() {
                DeadCodeReason::NoCallers
            } else if predecessors.iter().all(|p| dead_nodes.contains(p)) {
                DeadCodeReason::OnlyCalledByDeadCode
            } else {
                DeadCodeReason::Unreachable
            };
            let confirmed_dead_chain = predecessors.iter().all(|p| dead_nodes.contains(p));

            let confidence = score_confidence(symbol, reason, confirmed_dead_chain);
            if confidence < 0.5 {
                continue;
            }
            out.push(DeadSymbol {
                symbol_id: symbol.id.clone(),
                name: symbol.name.clone(),
                file_path: symbol.file_path.clone(),
                reason,
                confidence,
            });
        }

        out.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        out.truncate(limit);
        Ok(out)
    }

    /// Symbols this symbol calls (outgoing), up to `depth` hops.
    pub fn callees_of(&self, symbol_id: &str, depth: usize) -> IndexResult<Vec<String>> {
        let inner = self.inner.read().map_err(lock_poisoned)?;
        let Some(&node) = inner.symbol_to_node.get(symbol_id) else {
            return Ok(Vec::new());
        };
        Ok(bfs_collect(&inner.graph, node, depth, Direction::Outgoing))
    }

    /// Symbols that call this symbol (incoming), up to `depth` hops.
    pub fn callers_of(&self, symbol_id: &str, depth: usize) -> IndexResult<Vec<String>> {
        let inner = self.inner.read().map_err(lock_poisoned)?;
        let Some(&node) = inner.symbol_to_node.get(symbol_id) else {
            return Ok(Vec::new());
        };
        Ok(bfs_collect(&inner.graph, node, depth, Direction::Incoming))
    }

    pub fn node_count(&self) -> usize {
        self.inner.read().map(|i| i.graph.node_count()).unwrap_or(0)
    }

    pub fn edge_count(&self) -> usize {
        self.inner.read().map(|i| i.graph.edge_count()).unwrap_or(0)
    }
}

fn lock_poisoned<E: std::fmt::Display>(e: E) -> IndexError {
    IndexError::Internal(format!("call graph lock poisoned: {e}"))
}

fn pick_candidate(candidates: &[String], context_file: &str, symbols: &HashMap<String, Symbol>) -> Option<String> {
    if candidates.len() == 1 {
        return candidates.first().cloned();
    }
    let context_dir = Path::new(context_file).parent();
    let mut sorted = candidates.to_vec();
    sorted.sort();
    sorted
        .iter()
        .find(|id| {
            symbols
                .get(*id)
                .is_some_and(|s| Path::new(&s.file_path).parent() == context_dir)
        })
        .or_else(|| sorted.first())
        .cloned()
}

fn bfs_collect(graph: &DiGraph<String, ()>, start: NodeIndex, depth: usize, direction: Direction) -> Vec<String> {
    let mut visited = HashSet::new();
    let mut frontier = vec![start];
    let mut out = Vec::new();
    for _ in 0..depth {
        let mut next_frontier = Vec::new();
        for &n in &frontier {
            for neighbor in graph.neighbors_directed(n, direction) {
                if visited.insert(neighbor) {
                    out.push(graph[neighbor].clone());
                    next_frontier.push(neighbor);
                }
            }
        }
        frontier = next_frontier;
    }
    out
}

/// §4.9 entry points: universal roots, per-language mains, test-function
/// naming, and handler-pattern naming.
fn is_entry_point(symbol: &Symbol) -> bool {
    let name = symbol.name.as_str();
    if matches!(name, "main" | "init" | "__init__" | "__main__" | "Main") {
        return true;
    }
    let lang = language_from_path(Path::new(&symbol.file_path));
    let lang_root = match lang {
        Language::Go => name == "init" || name == "main" || name == "TestMain" || name == "ServeHTTP",
        Language::Python => name == "main",
        Language::Java | Language::CSharp | Language::Kotlin => name == "main" || name == "Main",
        _ => false,
    };
    if lang_root {
        return true;
    }

    if is_test_file_path(&symbol.file_path) {
        return true;
    }

    let lower = name.to_lowercase();
    if lower.starts_with("test_") || name.starts_with("Test") || lower.ends_with("_test") || lower.starts_with("test") {
        return true;
    }
    if lower.starts_with("handle") || name.ends_with("Handler") || name.ends_with("handler") {
        return true;
    }
    if name.starts_with("On") || (name.starts_with("on") && name.chars().nth(2).is_some_and(char::is_uppercase)) {
        return true;
    }
    false
}

/// §4.9 test-file-path heuristics: a symbol defined in a test file is an
/// entry point so the code it exercises stays reachable, even when the
/// symbol's own name doesn't match a test-naming pattern.
fn is_test_file_path(file_path: &str) -> bool {
    let lower = file_path.to_lowercase();
    if lower.ends_with("_test.go") || lower.ends_with(".test.ts") {
        return true;
    }
    let file_name = Path::new(&lower).file_name().and_then(|n| n.to_str()).unwrap_or("");
    if file_name.starts_with("test_") && file_name.ends_with(".py") {
        return true;
    }
    lower.contains("/test/") || lower.contains("/tests/")
}

fn is_interface_implementation_candidate_language(file_path: &str) -> bool {
    matches!(
        language_from_path(Path::new(file_path)),
        Language::Go | Language::Java | Language::Rust | Language::Kotlin | Language::Swift | Language::CSharp | Language::TypeScript
    )
}

fn score_confidence(symbol: &Symbol, reason: DeadCodeReason, confirmed_dead_chain: bool) -> f64 {
    let mut score: f64 = 0.85;
    if matches!(symbol.visibility, Visibility::Public) {
        score -= 0.30;
    }
    if is_constructor_name(&symbol.name) {
        score -= 0.15;
    }
    if symbol.kind == SymbolKind::Method && is_interface_implementation_candidate_language(&symbol.file_path) {
        score -= 0.20;
    }
    let lower = symbol.name.to_lowercase();
    if lower.starts_with("handle") || symbol.name.ends_with("Handler") || symbol.name.ends_with("handler") || lower.contains("middleware") {
        score -= 0.15;
    }
    if symbol.name.starts_with("On") || symbol.name.starts_with("on") {
        score -= 0.10;
    }
    if confirmed_dead_chain && reason != DeadCodeReason::NoCallers {
        score += 0.10;
    }
    score.clamp(0.0, 1.0)
}

fn is_constructor_name(name: &str) -> bool {
    name.starts_with("New") || name.starts_with("Create") || name.starts_with("Make")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReferenceKind;

    fn symbol(id: &str, name: &str, file_path: &str, visibility: Visibility) -> Symbol {
        Symbol {
            id: id.to_string(),
            name: name.to_string(),
            kind: SymbolKind::Function,
            file_path: file_path.to_string(),
            start_line: 1,
            end_line: 3,
            line_count: 3,
            signature: None,
            visibility,
            doc_comment: None,
        }
    }

    fn call_ref(file_path: &str, from: &str, to: &str) -> Reference {
        Reference {
            id: format!("{file_path}:1:call:{to}"),
            from_symbol: from.to_string(),
            to_symbol: to.to_string(),
            kind: ReferenceKind::Call,
            file_path: file_path.to_string(),
            line: 1,
            is_external: false,
        }
    }

    #[test]
    fn reachable_chain_from_main_is_not_dead() {
        let symbols = vec![
            symbol("a.go:main:1", "main", "a.go", Visibility::Private),
            symbol("a.go:helper:5", "helper", "a.go", Visibility::Private),
        ];
        let refs = vec![call_ref("a.go", "main", "helper")];
        let graph = CallGraph::build(symbols, &refs).expect("build");
        let dead = graph.dead_code(10).expect("dead code");
        assert!(dead.is_empty());
    }

    #[test]
    fn unreferenced_private_function_is_dead_with_no_callers_reason() {
        let symbols = vec![
            symbol("a.go:main:1", "main", "a.go", Visibility::Private),
            symbol("a.go:orphan:5", "orphan", "a.go", Visibility::Private),
        ];
        let graph = CallGraph::build(symbols, &[]).expect("build");
        let dead = graph.dead_code(10).expect("dead code");
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].name, "orphan");
        assert_eq!(dead[0].reason, DeadCodeReason::NoCallers);
    }

    #[test]
    fn exported_dead_function_scores_lower_confidence_than_private() {
        let symbols = vec![
            symbol("a.go:main:1", "main", "a.go", Visibility::Private),
            symbol("a.go:Exported:5", "Exported", "a.go", Visibility::Public),
            symbol("a.go:private_orphan:9", "private_orphan", "a.go", Visibility::Private),
        ];
        let graph = CallGraph::build(symbols, &[]).expect("build");
        let dead = graph.dead_code(10).expect("dead code");
        let exported = dead.iter().find(|d| d.name == "Exported").expect("exported present");
        let private = dead.iter().find(|d| d.name == "private_orphan").expect("private present");
        assert!(exported.confidence < private.confidence);
    }

    #[test]
    fn chain_of_only_dead_callers_gets_only_called_by_dead_code_reason() {
        let symbols = vec![
            symbol("a.go:main:1", "main", "a.go", Visibility::Private),
            symbol("a.go:deadRoot:5", "deadRoot", "a.go", Visibility::Private),
            symbol("a.go:deadLeaf:9", "deadLeaf", "a.go", Visibility::Private),
        ];
        let refs = vec![call_ref("a.go", "deadRoot", "deadLeaf")];
        let graph = CallGraph::build(symbols, &refs).expect("build");
        let dead = graph.dead_code(10).expect("dead code");
        let leaf = dead.iter().find(|d| d.name == "deadLeaf").expect("leaf present");
        assert_eq!(leaf.reason, DeadCodeReason::OnlyCalledByDeadCode);
    }

    #[test]
    fn bare_name_resolution_prefers_same_directory_candidate() {
        let symbols = vec![
            symbol("main.go:main:1", "main", "main.go", Visibility::Private),
            symbol("pkg/a/helper.go:Run:1", "Run", "pkg/a/helper.go", Visibility::Public),
            symbol("pkg/b/helper.go:Run:1", "Run", "pkg/b/helper.go", Visibility::Public),
        ];
        let refs = vec![call_ref("pkg/a/caller.go", "main", "Run")];
        let graph = CallGraph::build(symbols, &refs).expect("build");
        let dead = graph.dead_code(10).expect("dead code");
        // main.go:main calls Run (bare, resolved without directory context, so
        // falls back to the first candidate) and caller.go also references Run
        // from pkg/a — pkg/a's Run should end up reachable.
        assert!(!dead.iter().any(|d| d.symbol_id == "pkg/a/helper.go:Run:1"));
    }

    #[test]
    fn handler_named_function_is_treated_as_an_entry_point() {
        let symbols = vec![symbol("a.go:handleRequest:1", "handleRequest", "a.go", Visibility::Private)];
        let graph = CallGraph::build(symbols, &[]).expect("build");
        let dead = graph.dead_code(10).expect("dead code");
        assert!(dead.is_empty());
    }

    #[test]
    fn go_serve_http_method_is_treated_as_an_entry_point() {
        let symbols = vec![symbol("a.go:ServeHTTP:1", "ServeHTTP", "a.go", Visibility::Private)];
        let graph = CallGraph::build(symbols, &[]).expect("build");
        let dead = graph.dead_code(10).expect("dead code");
        assert!(dead.is_empty());
    }

    #[test]
    fn symbol_in_go_test_file_is_treated_as_an_entry_point_regardless_of_name() {
        let symbols = vec![symbol("a_test.go:setupFixture:1", "setupFixture", "a_test.go", Visibility::Private)];
        let graph = CallGraph::build(symbols, &[]).expect("build");
        let dead = graph.dead_code(10).expect("dead code");
        assert!(dead.is_empty());
    }

    #[test]
    fn symbol_in_python_test_file_is_treated_as_an_entry_point() {
        let symbols = vec![symbol("pkg/test_utils.py:fixture:1", "fixture", "pkg/test_utils.py", Visibility::Private)];
        let graph = CallGraph::build(symbols, &[]).expect("build");
        let dead = graph.dead_code(10).expect("dead code");
        assert!(dead.is_empty());
    }

    #[test]
    fn symbol_in_ts_test_file_is_treated_as_an_entry_point() {
        let symbols = vec![symbol("widget.test.ts:setup:1", "setup", "widget.test.ts", Visibility::Private)];
        let graph = CallGraph::build(symbols, &[]).expect("build");
        let dead = graph.dead_code(10).expect("dead code");
        assert!(dead.is_empty());
    }

    #[test]
    fn symbol_under_tests_directory_is_treated_as_an_entry_point() {
        let symbols = vec![symbol("tests/fixtures.go:buildFixture:1", "buildFixture", "tests/fixtures.go", Visibility::Private)];
        let graph = CallGraph::build(symbols, &[]).expect("build");
        let dead = graph.dead_code(10).expect("dead code");
        assert!(dead.is_empty());
    }

    #[test]
    fn dead_code_list_is_sorted_by_confidence_descending() {
        let symbols = vec![
            symbol("a.go:main:1", "main", "a.go", Visibility::Private),
            symbol("a.go:Exported:5", "Exported", "a.go", Visibility::Public),
            symbol("a.go:private_orphan:9", "private_orphan", "a.go", Visibility::Private),
        ];
        let graph = CallGraph::build(symbols, &[]).expect("build");
        let dead = graph.dead_code(10).expect("dead code");
        for window in dead.windows(2) {
            assert!(window[0].confidence >= window[1].confidence);
        }
    }
}
