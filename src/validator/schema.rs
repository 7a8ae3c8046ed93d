//! Graph schema allowlists.
//!
//! The validator only knows the schema through this table. Changing the
//! graph model means changing the data here, not the rules.

use hashbrown::HashSet;

/// Label/relationship/property allowlists plus the property classes the
/// executor and validator treat specially.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphSchema {
    labels: HashSet<String>,
    relationship_types: HashSet<String>,
    properties: HashSet<String>,
    list_properties: HashSet<String>,
    case_insensitive_properties: HashSet<String>,
    description: String,
}

const LABELS: &[&str] = &["Gene", "Variant", "Therapy", "Disease", "Biomarker"];

const RELATIONSHIP_TYPES: &[&str] = &["VARIANT_OF", "TARGETS", "AFFECTS_RESPONSE_TO"];

const PROPERTIES: &[&str] = &[
    // Gene
    "symbol", "hgnc_id", "synonyms",
    // Variant / Therapy / Disease
    "name", "hgvs_p", "consequence", "modality", "tags", "chembl_id", "doid",
    // TARGETS
    "source", "moa", "action_type", "ref_sources", "ref_ids", "ref_urls",
    // AFFECTS_RESPONSE_TO
    "effect", "disease_name", "disease_id", "pmids", "notes",
    "best_evidence_level", "evidence_levels", "evidence_count", "avg_rating", "max_rating",
];

const LIST_PROPERTIES: &[&str] = &[
    "pmids", "tags", "synonyms", "ref_sources", "ref_ids", "ref_urls", "evidence_levels",
];

const CASE_INSENSITIVE_PROPERTIES: &[&str] = &["name", "disease_name", "effect"];

const ONCOLOGY_DESCRIPTION: &str = "\
Nodes:
- Gene {symbol, hgnc_id, synonyms[]}
- Variant {name, hgvs_p, consequence, synonyms[]}
- Therapy {name, modality, tags[], chembl_id, synonyms[]}
- Disease {name, doid, synonyms[]}
- Biomarker: additional label on Gene or Variant nodes

Relationships:
- (Variant)-[:VARIANT_OF]->(Gene)
- (Therapy)-[:TARGETS {source, moa, action_type, ref_sources[], ref_ids[], ref_urls[]}]->(Gene)
- (Biomarker)-[:AFFECTS_RESPONSE_TO {effect, disease_name, disease_id, pmids[], source, notes,
  best_evidence_level, evidence_levels[], evidence_count, avg_rating, max_rating}]->(Therapy)

List-valued properties: pmids, tags, synonyms, ref_sources, ref_ids, ref_urls, evidence_levels.
effect is one of 'sensitivity' or 'resistance'.";

fn set(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

impl GraphSchema {
    /// Empty schema; everything is rejected until allowlisted.
    pub fn empty() -> Self {
        Self {
            labels: HashSet::new(),
            relationship_types: HashSet::new(),
            properties: HashSet::new(),
            list_properties: HashSet::new(),
            case_insensitive_properties: HashSet::new(),
            description: String::new(),
        }
    }

    /// The oncology knowledge graph: genes, variants, therapies, diseases
    /// and biomarker evidence.
    pub fn oncology() -> Self {
        Self {
            labels: set(LABELS),
            relationship_types: set(RELATIONSHIP_TYPES),
            properties: set(PROPERTIES),
            list_properties: set(LIST_PROPERTIES),
            case_insensitive_properties: set(CASE_INSENSITIVE_PROPERTIES),
            description: ONCOLOGY_DESCRIPTION.to_string(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }

    pub fn with_relationship_type(mut self, rel_type: impl Into<String>) -> Self {
        self.relationship_types.insert(rel_type.into());
        self
    }

    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.properties.insert(property.into());
        self
    }

    /// Allowlist a list-typed property.
    pub fn with_list_property(mut self, property: impl Into<String>) -> Self {
        let property = property.into();
        self.properties.insert(property.clone());
        self.list_properties.insert(property);
        self
    }

    /// Allowlist a property compared case-insensitively against literals.
    pub fn with_case_insensitive_property(mut self, property: impl Into<String>) -> Self {
        let property = property.into();
        self.properties.insert(property.clone());
        self.case_insensitive_properties.insert(property);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn has_relationship_type(&self, rel_type: &str) -> bool {
        self.relationship_types.contains(rel_type)
    }

    pub fn has_property(&self, property: &str) -> bool {
        self.properties.contains(property)
    }

    pub fn is_list_property(&self, property: &str) -> bool {
        self.list_properties.contains(property)
    }

    pub fn is_case_insensitive(&self, property: &str) -> bool {
        self.case_insensitive_properties.contains(property)
    }

    pub fn list_properties(&self) -> impl Iterator<Item = &str> {
        self.list_properties.iter().map(String::as_str)
    }

    /// Plain-text schema summary for prompts.
    pub fn describe(&self) -> &str {
        &self.description
    }
}

impl Default for GraphSchema {
    fn default() -> Self {
        Self::oncology()
    }
}
