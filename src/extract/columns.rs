// src/extract/columns.rs

use crate::error::ExtractError;

/// Logical fields of a yearly extract, each with its ordered header aliases.
/// First alias present in the header wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    QuestionnaireId,
    Description,
    RowLabel,
    ColumnLabel,
    InstId,
    InstName,
    InstCity,
    InstState,
    Value,
    Year,
}

impl Field {
    pub const fn name(self) -> &'static str {
        match self {
            Field::QuestionnaireId => "questionnaire_id",
            Field::Description => "description",
            Field::RowLabel => "row_label",
            Field::ColumnLabel => "column_label",
            Field::InstId => "inst_id",
            Field::InstName => "inst_name",
            Field::InstCity => "inst_city",
            Field::InstState => "inst_state",
            Field::Value => "value",
            Field::Year => "year",
        }
    }

    pub const fn aliases(self) -> &'static [&'static str] {
        match self {
            Field::QuestionnaireId => &["questionnaire_no"],
            Field::Description => &["question"],
            Field::RowLabel => &["row", "row_label", "question_label"],
            Field::ColumnLabel => &["column", "column_label", "col"],
            Field::InstId => &["inst_id"],
            Field::InstName => &["inst_name_long"],
            Field::InstCity => &["inst_city"],
            Field::InstState => &["inst_state_code"],
            Field::Value => &["data"],
            Field::Year => &["year"],
        }
    }
}

/// Header positions for every logical field, resolved once per extract.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedColumns {
    pub questionnaire_id: Option<usize>,
    pub description: Option<usize>,
    pub row_label: Option<usize>,
    pub column_label: Option<usize>,
    pub inst_id: Option<usize>,
    pub inst_name: Option<usize>,
    pub inst_city: Option<usize>,
    pub inst_state: Option<usize>,
    pub value: Option<usize>,
    pub year: Option<usize>,
}

impl ResolvedColumns {
    /// Probe each field's aliases against the lower-cased, trimmed header.
    pub fn resolve<S: AsRef<str>>(headers: &[S]) -> Self {
        let canon: Vec<String> = headers
            .iter()
            .map(|h| h.as_ref().trim().to_lowercase())
            .collect();
        let find = |field: Field| {
            field
                .aliases()
                .iter()
                .find_map(|alias| canon.iter().position(|h| h == alias))
        };

        Self {
            questionnaire_id: find(Field::QuestionnaireId),
            description: find(Field::Description),
            row_label: find(Field::RowLabel),
            column_label: find(Field::ColumnLabel),
            inst_id: find(Field::InstId),
            inst_name: find(Field::InstName),
            inst_city: find(Field::InstCity),
            inst_state: find(Field::InstState),
            value: find(Field::Value),
            year: find(Field::Year),
        }
    }

    pub fn get(&self, field: Field) -> Option<usize> {
        match field {
            Field::QuestionnaireId => self.questionnaire_id,
            Field::Description => self.description,
            Field::RowLabel => self.row_label,
            Field::ColumnLabel => self.column_label,
            Field::InstId => self.inst_id,
            Field::InstName => self.inst_name,
            Field::InstCity => self.inst_city,
            Field::InstState => self.inst_state,
            Field::Value => self.value,
            Field::Year => self.year,
        }
    }

    /// Error on the first of `required` that has no matching header.
    pub fn require(&self, path: &str, required: &[Field]) -> Result<(), ExtractError> {
        match required.iter().find(|f| self.get(**f).is_none()) {
            Some(missing) => Err(ExtractError::SchemaResolution {
                path: path.to_string(),
                field: missing.name(),
                tried: missing.aliases(),
            }),
            None => Ok(()),
        }
    }
}
