//! Survey aggregation: question columns → response frequency tallies.

use crate::model::{QuestionAggregate, ResponseCounts, TableData};
use crate::schema::QuestionColumnPolicy;
use tracing::debug;

/// Tally every question column of `table`, left to right.
///
/// Responses are trimmed and blank cells ignored; distinct values keep the
/// order they were first seen in. A question nobody answered still yields an
/// aggregate, with empty counts.
pub fn aggregate_responses(
    table: &TableData,
    policy: &QuestionColumnPolicy,
) -> Vec<QuestionAggregate> {
    table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, header)| policy.is_question(header))
        .map(|(idx, header)| {
            let mut counts = ResponseCounts::new();
            for row in &table.rows {
                if let Some((_, value)) = row.cells().nth(idx) {
                    let value = value.trim();
                    if !value.is_empty() {
                        counts.record(value);
                    }
                }
            }
            debug!(
                "Question '{}': {} responses, {} distinct",
                header,
                counts.total(),
                counts.len()
            );
            QuestionAggregate {
                question_label: header.clone(),
                response_counts: counts,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ingest::ingest;
    use crate::schema::SheetRequirement;

    fn sheet(csv: &str) -> TableData {
        let policy = QuestionColumnPolicy::default();
        ingest(
            csv.as_bytes(),
            "feedback",
            &SheetRequirement::QuestionColumns(policy),
        )
        .unwrap()
    }

    #[test]
    fn tallies_in_first_seen_order() {
        let table = sheet(
            "Name,Was it useful?,Would you return?\n\
             A,Yes,No\n\
             B,No,No\n\
             C,Yes,\n\
             D, Yes ,Maybe\n",
        );
        let aggs = aggregate_responses(&table, &QuestionColumnPolicy::default());
        assert_eq!(aggs.len(), 2);
        assert_eq!(aggs[0].question_label, "Was it useful?");
        assert_eq!(
            aggs[0].response_counts.iter().collect::<Vec<_>>(),
            vec![("Yes", 3), ("No", 1)]
        );
        assert_eq!(
            aggs[1].response_counts.iter().collect::<Vec<_>>(),
            vec![("No", 2), ("Maybe", 1)]
        );
    }

    #[test]
    fn sum_of_counts_equals_non_empty_cells() {
        let table = sheet(
            "Rating?,Comment?\n5,ok\n4,\n,\n5,great\n3,  \n",
        );
        for (idx, agg) in aggregate_responses(&table, &QuestionColumnPolicy::default())
            .iter()
            .enumerate()
        {
            let non_empty = table
                .rows
                .iter()
                .filter(|r| {
                    r.cells()
                        .nth(idx)
                        .map(|(_, v)| !v.trim().is_empty())
                        .unwrap_or(false)
                })
                .count();
            assert_eq!(agg.response_counts.total(), non_empty);
        }
    }

    #[test]
    fn unanswered_question_yields_empty_aggregate() {
        let table = sheet("Name,Anything else?\nA,\nB,\n");
        let aggs = aggregate_responses(&table, &QuestionColumnPolicy::default());
        assert_eq!(aggs.len(), 1);
        assert!(aggs[0].response_counts.is_empty());
    }

    #[test]
    fn custom_marker_policy() {
        let table = sheet("Q: Rating?,Name\n5,A\n");
        let aggs = aggregate_responses(&table, &QuestionColumnPolicy::HeaderContains(':'));
        assert_eq!(aggs.len(), 1);
        assert_eq!(aggs[0].question_label, "Q: Rating?");
    }
}
