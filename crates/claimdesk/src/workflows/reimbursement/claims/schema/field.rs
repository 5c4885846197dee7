use serde::{Deserialize, Serialize};

use super::super::domain::{BusinessAttribute, EvidenceSlot};

/// Input kind of a configurable field; select fields carry their options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Select { options: Vec<String> },
    Email,
    File,
}

impl FieldKind {
    pub const fn label(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Number => "number",
            FieldKind::Select { .. } => "select",
            FieldKind::Email => "email",
            FieldKind::File => "file",
        }
    }

    fn same_kind(&self, other: &FieldKind) -> bool {
        self.label() == other.label()
    }
}

/// Form sections used to group fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSection {
    Order,
    Payment,
    Evidence,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: String,
    pub label: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    pub section: FieldSection,
    #[serde(default)]
    pub required: bool,
    /// When set the value lives on the claim itself rather than in the extra map.
    #[serde(default)]
    pub binding: Option<BusinessAttribute>,
    #[serde(default)]
    pub system: bool,
}

impl FieldDefinition {
    pub fn custom(id: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind,
            section: FieldSection::Other,
            required: false,
            binding: None,
            system: false,
        }
    }

    fn system(
        id: &str,
        label: &str,
        kind: FieldKind,
        section: FieldSection,
        required: bool,
        binding: BusinessAttribute,
    ) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            kind,
            section,
            required,
            binding: Some(binding),
            system: true,
        }
    }
}

/// Explicit affirmation required before a system field can be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalConfirmation {
    Unconfirmed,
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldConfigError {
    #[error("field '{0}' does not exist")]
    UnknownField(String),
    #[error("field id '{0}' is already in use")]
    DuplicateId(String),
    #[error("field id must not be blank")]
    BlankId,
    #[error("system field '{0}' cannot change its id or type")]
    SystemFieldImmutable(String),
    #[error("removing system field '{0}' requires confirmation")]
    ConfirmationRequired(String),
    #[error("field '{0}' is not a select field")]
    NotSelect(String),
    #[error("option '{option}' already exists on field '{field}'")]
    DuplicateOption { field: String, option: String },
    #[error("option '{option}' does not exist on field '{field}'")]
    UnknownOption { field: String, option: String },
}

/// Ordered, whole-unit configuration of the claim form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSet {
    fields: Vec<FieldDefinition>,
}

impl Default for FieldSet {
    fn default() -> Self {
        Self::standard()
    }
}

impl FieldSet {
    pub fn new(fields: Vec<FieldDefinition>) -> Result<Self, FieldConfigError> {
        let mut set = Self { fields: Vec::new() };
        for field in fields {
            set.add(field)?;
        }
        Ok(set)
    }

    /// Default reimbursement form.
    pub fn standard() -> Self {
        use BusinessAttribute as Attr;
        use FieldSection as Section;

        let fields = vec![
            FieldDefinition::system(
                "store_name",
                "Store",
                FieldKind::Text,
                Section::Order,
                true,
                Attr::StoreName,
            ),
            FieldDefinition::system(
                "sku",
                "SKU",
                FieldKind::Text,
                Section::Order,
                false,
                Attr::Sku,
            ),
            FieldDefinition::system(
                "model",
                "Model",
                FieldKind::Text,
                Section::Order,
                false,
                Attr::Model,
            ),
            FieldDefinition::system(
                "order_id",
                "Order ID",
                FieldKind::Text,
                Section::Order,
                true,
                Attr::OrderId,
            ),
            FieldDefinition::system(
                "item_reason",
                "Expense attribute",
                FieldKind::Select {
                    options: vec![
                        "本金".to_string(),
                        "佣金".to_string(),
                        "退款".to_string(),
                    ],
                },
                Section::Order,
                true,
                Attr::ItemReason,
            ),
            FieldDefinition::system(
                "amount_usd",
                "Amount (USD)",
                FieldKind::Number,
                Section::Payment,
                true,
                Attr::AmountUsd,
            ),
            FieldDefinition::system(
                "amount_cny",
                "Amount (CNY)",
                FieldKind::Number,
                Section::Payment,
                false,
                Attr::AmountCny,
            ),
            FieldDefinition::system(
                "payment_method",
                "Payment method",
                FieldKind::Select {
                    options: vec![
                        "PayPal".to_string(),
                        "Alipay".to_string(),
                        "WeChat".to_string(),
                        "Bank transfer".to_string(),
                    ],
                },
                Section::Payment,
                false,
                Attr::PaymentMethod,
            ),
            FieldDefinition::system(
                "client_email",
                "Client email",
                FieldKind::Email,
                Section::Other,
                false,
                Attr::ClientEmail,
            ),
            FieldDefinition::system(
                "usd_transfer_screenshot",
                "USD transfer screenshot",
                FieldKind::File,
                Section::Evidence,
                true,
                Attr::Evidence(EvidenceSlot::UsdTransfer),
            ),
            FieldDefinition::system(
                "cny_transfer_screenshot",
                "CNY transfer screenshot",
                FieldKind::File,
                Section::Evidence,
                false,
                Attr::Evidence(EvidenceSlot::CnyTransfer),
            ),
            FieldDefinition::system(
                "order_id_screenshot",
                "Order ID screenshot",
                FieldKind::File,
                Section::Evidence,
                false,
                Attr::Evidence(EvidenceSlot::OrderId),
            ),
            FieldDefinition::system(
                "note",
                "Note",
                FieldKind::Text,
                Section::Other,
                false,
                Attr::Note,
            ),
        ];

        Self { fields }
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn get(&self, id: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|field| field.id == id)
    }

    pub fn required(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|field| field.required)
    }

    fn position(&self, id: &str) -> Result<usize, FieldConfigError> {
        self.fields
            .iter()
            .position(|field| field.id == id)
            .ok_or_else(|| FieldConfigError::UnknownField(id.to_string()))
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut FieldDefinition, FieldConfigError> {
        let index = self.position(id)?;
        Ok(&mut self.fields[index])
    }

    pub fn add(&mut self, field: FieldDefinition) -> Result<(), FieldConfigError> {
        if field.id.trim().is_empty() {
            return Err(FieldConfigError::BlankId);
        }
        if self.get(&field.id).is_some() {
            return Err(FieldConfigError::DuplicateId(field.id));
        }
        self.fields.push(field);
        Ok(())
    }

    pub fn remove(
        &mut self,
        id: &str,
        confirmation: RemovalConfirmation,
    ) -> Result<FieldDefinition, FieldConfigError> {
        let index = self.position(id)?;
        if self.fields[index].system && confirmation != RemovalConfirmation::Confirmed {
            return Err(FieldConfigError::ConfirmationRequired(id.to_string()));
        }
        Ok(self.fields.remove(index))
    }

    pub fn rename(&mut self, id: &str, label: impl Into<String>) -> Result<(), FieldConfigError> {
        self.get_mut(id)?.label = label.into();
        Ok(())
    }

    pub fn set_required(&mut self, id: &str, required: bool) -> Result<(), FieldConfigError> {
        self.get_mut(id)?.required = required;
        Ok(())
    }

    pub fn move_to_section(
        &mut self,
        id: &str,
        section: FieldSection,
    ) -> Result<(), FieldConfigError> {
        self.get_mut(id)?.section = section;
        Ok(())
    }

    pub fn add_option(
        &mut self,
        id: &str,
        option: impl Into<String>,
    ) -> Result<(), FieldConfigError> {
        let option = option.into();
        let field = self.get_mut(id)?;
        let FieldKind::Select { options } = &mut field.kind else {
            return Err(FieldConfigError::NotSelect(id.to_string()));
        };
        if options.iter().any(|existing| existing == &option) {
            return Err(FieldConfigError::DuplicateOption {
                field: id.to_string(),
                option,
            });
        }
        options.push(option);
        Ok(())
    }

    pub fn remove_option(&mut self, id: &str, option: &str) -> Result<(), FieldConfigError> {
        let field = self.get_mut(id)?;
        let FieldKind::Select { options } = &mut field.kind else {
            return Err(FieldConfigError::NotSelect(id.to_string()));
        };
        let before = options.len();
        options.retain(|existing| existing != option);
        if options.len() == before {
            return Err(FieldConfigError::UnknownOption {
                field: id.to_string(),
                option: option.to_string(),
            });
        }
        Ok(())
    }

    /// Replace a definition wholesale, keeping system fields' id and type fixed.
    pub fn replace(&mut self, id: &str, field: FieldDefinition) -> Result<(), FieldConfigError> {
        let index = self.position(id)?;
        let current = &self.fields[index];
        if current.system && (field.id != current.id || !current.kind.same_kind(&field.kind)) {
            return Err(FieldConfigError::SystemFieldImmutable(id.to_string()));
        }
        if field.id != id && self.get(&field.id).is_some() {
            return Err(FieldConfigError::DuplicateId(field.id));
        }
        let system = current.system;
        let binding = current.binding;
        self.fields[index] = FieldDefinition {
            system,
            binding: if system { binding } else { field.binding },
            ..field
        };
        Ok(())
    }

    /// Check a whole replacement configuration against this one.
    ///
    /// System fields may be relabeled, reordered, moved, or made optional, but keep their id,
    /// type, and binding. Dropping one needs `Confirmed`. Fields that are not system fields here
    /// cannot become system fields through a replacement.
    pub fn reconcile(
        &self,
        next: FieldSet,
        confirmation: RemovalConfirmation,
    ) -> Result<FieldSet, FieldConfigError> {
        for current in self.fields.iter().filter(|field| field.system) {
            match next.get(&current.id) {
                None if confirmation != RemovalConfirmation::Confirmed => {
                    return Err(FieldConfigError::ConfirmationRequired(current.id.clone()));
                }
                None => {}
                Some(field) if !field.system || !current.kind.same_kind(&field.kind) => {
                    return Err(FieldConfigError::SystemFieldImmutable(current.id.clone()));
                }
                Some(_) => {}
            }
        }

        let fields = next
            .fields
            .into_iter()
            .map(|field| match self.get(&field.id).filter(|current| current.system) {
                Some(current) => FieldDefinition {
                    binding: current.binding,
                    ..field
                },
                None => FieldDefinition {
                    system: false,
                    ..field
                },
            })
            .collect();
        Ok(FieldSet { fields })
    }
}
