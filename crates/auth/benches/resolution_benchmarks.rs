use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use hrgate_auth::{
    resolve, Action, Decision, HierarchyGraph, HierarchyNode, ModuleCatalog, NodeType, PermissionQuery,
    PermissionRule, PolicySnapshot, Principal, Role, RuleSet, RuleSubject, Scope, SimulationSubject, Simulator,
};
use hrgate_core::{NodeId, PrincipalId};

/// A chain global → company → location → department → team of the given fan-out,
/// with rules sprinkled over every level.
fn build_snapshot(teams: usize) -> (PolicySnapshot, NodeId) {
    let global = NodeId::new("global");
    let company = NodeId::new("company");
    let location = NodeId::new("location");
    let department = NodeId::new("department");

    let mut nodes = vec![
        HierarchyNode::root("global", "Global"),
        HierarchyNode::child("company", NodeType::Company, &global, "Company"),
        HierarchyNode::child("location", NodeType::Location, &company, "Location"),
        HierarchyNode::child("department", NodeType::Department, &location, "Department"),
    ];
    for i in 0..teams {
        nodes.push(HierarchyNode::child(
            format!("team-{i}"),
            NodeType::Team,
            &department,
            format!("Team {i}"),
        ));
    }
    let graph = HierarchyGraph::from_nodes(nodes).expect("valid hierarchy");

    let mut rules = RuleSet::new();
    let catalog = ModuleCatalog::hr_default();
    for (idx, query) in catalog.queries().into_iter().enumerate() {
        let (node, decision) = match idx % 5 {
            0 => ("global", Decision::Grant),
            1 => ("company", Decision::Deny),
            2 => ("department", Decision::Grant),
            3 => ("team-0", Decision::Deny),
            _ => continue,
        };
        rules.upsert(PermissionRule::new(
            RuleSubject::role("manager"),
            NodeId::new(node),
            query,
            decision,
            Utc::now(),
        ));
    }
    rules.upsert(PermissionRule::new(
        RuleSubject::role("manager"),
        NodeId::new("global"),
        PermissionQuery::new("salary", Action::View, Scope::Company),
        Decision::LockDeny,
        Utc::now(),
    ));

    let snapshot = PolicySnapshot::new(graph, rules, 1).expect("rules bound to known nodes");
    (snapshot, NodeId::new("team-0"))
}

fn bench_single_resolution(c: &mut Criterion) {
    let (snapshot, team) = build_snapshot(16);
    let principal = Principal::new(PrincipalId::new("alice"), team).with_role(Role::new("manager"));

    let mut group = c.benchmark_group("resolve");
    for (name, query) in [
        ("locked", PermissionQuery::new("salary", Action::View, Scope::Company)),
        ("overridden", PermissionQuery::new("absence", Action::Edit, Scope::Team)),
        ("default_deny", PermissionQuery::new("unknown", Action::View, Scope::Own)),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| black_box(resolve(&snapshot, &principal, black_box(&query))));
        });
    }
    group.finish();
}

fn bench_simulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulate");
    for teams in [1usize, 64, 512] {
        let (snapshot, team) = build_snapshot(teams);
        let catalog = ModuleCatalog::hr_default();
        let subject = SimulationSubject::Role {
            role: Role::new("manager"),
            node_id: team,
        };
        group.throughput(Throughput::Elements(catalog.queries().len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(teams), &subject, |b, subject| {
            let simulator = Simulator::new(&snapshot, &catalog);
            b.iter(|| black_box(simulator.simulate(subject).expect("simulation within deadline")));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_single_resolution, bench_simulation);
criterion_main!(benches);
