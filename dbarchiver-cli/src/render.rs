//! ASCII rendering for the `plan` subcommand: copy/delete order tables, the
//! edge list, and an indented relation tree, grounded in the teacher's use
//! of `prettytable` for other tabular CLI output.

use dbarchiver_config::JobConfig;
use dbarchiver_graph::Graph;
use prettytable::{row, Table};

pub fn render_plan(job: &JobConfig, graph: &Graph) -> String {
    let mut out = String::new();

    out.push_str(&format!("job: {}\n", job.name));
    out.push_str(&format!(
        "root: {} (pk={})  batch_size={}  batch_delete_size={}  verification={:?}\n\n",
        job.root_table, job.primary_key, job.batch_size, job.batch_delete_size, job.verification_method
    ));

    out.push_str("relation tree:\n");
    render_tree(graph, graph.root_name(), 0, &mut out);
    out.push('\n');

    out.push_str("copy order:\n");
    out.push_str(&order_table(graph.copy_order()).to_string());
    out.push('\n');

    out.push_str("delete order:\n");
    out.push_str(&order_table(&graph.delete_order()).to_string());
    out.push('\n');

    out.push_str("edges:\n");
    out.push_str(&edge_table(graph).to_string());

    out
}

fn render_tree(graph: &Graph, table: &str, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    out.push_str(&format!("{indent}{table} (pk={})\n", graph.pk(table).unwrap_or("?")));
    for child in graph.children_of(table) {
        render_tree(graph, child, depth + 1, out);
    }
}

fn order_table(order: &[String]) -> Table {
    let mut table = Table::new();
    table.add_row(row!["#", "table"]);
    for (i, name) in order.iter().enumerate() {
        table.add_row(row![i + 1, name]);
    }
    table
}

fn edge_table(graph: &Graph) -> Table {
    let mut table = Table::new();
    table.add_row(row!["parent", "child", "fk_column", "ref_column", "dependency"]);
    for parent in graph.table_names() {
        for child in graph.children_of(parent) {
            if let Some(meta) = graph.edge_meta(parent, child) {
                table.add_row(row![parent, child, meta.fk_column, meta.ref_column, meta.dep_kind]);
            }
        }
    }
    table
}
