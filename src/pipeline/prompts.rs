//! Prompt templates. Placeholders are `{schema}`, `{question}`,
//! `{instructions}` and `{rows}`.

/// Query-writing rules shared by the expander and generator prompts.
pub const QUERY_RULES: &str = "\
Query rules:
- Read-only Cypher: MATCH, OPTIONAL MATCH, WHERE, WITH, UNWIND, RETURN, ORDER BY, SKIP, LIMIT.
- Inline single-quoted literals only; never use $parameters.
- Compare strings case-insensitively with toLower() on both sides.
- Wrap list properties with coalesce(x, []) before any()/all()/UNWIND.
- Match genes by symbol or synonyms:
  toLower(g.symbol) = toLower('BRAF') OR any(s IN coalesce(g.synonyms, []) WHERE toLower(s) = toLower('BRAF')).
- A specific variant always requires (v:Variant)-[:VARIANT_OF]->(g:Gene). For bare protein changes
  such as 'V600E' use toLower(v.name) CONTAINS toLower('V600E'). Fusions match either orientation
  with the '::' separator.
- Disease filters match each informative token separately on rel.disease_name with CONTAINS,
  leaving out generic words such as 'cancer' or 'tumor'.
- Predictive evidence (AFFECTS_RESPONSE_TO) returns variant_name, gene_symbol, therapy_name, effect,
  disease_name, pmids, best_evidence_level, evidence_levels, evidence_count, avg_rating, max_rating,
  sorted by best_evidence_level ASC, evidence_count DESC. Gene-level questions return NULL AS variant_name
  and aggregate per gene, therapy and disease.
- Targeting (TARGETS) returns gene_symbol, therapy_name, r.moa AS targets_moa, ref_sources, ref_ids, ref_urls.
- Variant lookups return variant_name and gene_symbol only.
- Always end with LIMIT 100.";

pub const INSTRUCTION_TEMPLATE: &str = "\
You help a Cypher generator query an oncology knowledge graph.

{schema}

{rules}

Rewrite the question below as 3 to 6 short bullet points that name the labels, relationships
and properties to use. State whether it is a predictive-evidence, targeting or variant-lookup
question and whether results stay at variant level or collapse to gene level. Keep it
tumor-agnostic unless a disease is named. Output only lines starting with \"- \"; no Cypher.

Question: {question}";

pub const CYPHER_TEMPLATE: &str = "\
Write one read-only Cypher query for the oncology knowledge graph below.

{schema}

{rules}

Implement the instructions exactly. Output the query only: no commentary and no code fences.

Instructions:
{instructions}";

pub const SUMMARY_TEMPLATE: &str = "\
You summarize results from an oncology knowledge graph for a researcher.

Question:
{question}

Rows:
{rows}

Guidelines:
- Open with a one or two sentence direct answer.
- When rows carry best_evidence_level, list level A and B items first and group C to E items together.
- Show evidence briefly, e.g. \"**KRAS** (Level A, 40 items)\", and cite at most three PMIDs per item
  as [PMID:12345].
- Merge entities that share an outcome into one bullet; group targeting rows by mechanism of action.
- Bold genes, therapies and diseases. Use bullets.
- If there are no rows, answer exactly: \"No evidence found in the current knowledge graph.\"
- Use only what the rows contain.";

/// Fill `{name}` placeholders. Unknown placeholders are left as-is.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter()
        .fold(template.to_string(), |out, (name, value)| out.replace(&format!("{{{name}}}"), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_fills_placeholders() {
        let out = render("Q: {question} / {missing}", &[("question", "BRAF?")]);
        assert_eq!(out, "Q: BRAF? / {missing}");
    }

    #[test]
    fn test_templates_carry_placeholders() {
        assert!(INSTRUCTION_TEMPLATE.contains("{question}"));
        assert!(CYPHER_TEMPLATE.contains("{instructions}"));
        assert!(SUMMARY_TEMPLATE.contains("{rows}"));
    }
}
