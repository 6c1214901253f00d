//! Tipos de dados trocados com os colaboradores e com o canal de saída.
//!
//! [`NotificationMessage`] é o contrato de fio consumido pelo worker de
//! entrega; as chaves JSON são camelCase e não devem mudar.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::state_machine::WorkflowKind;

/// Template associado a um par (workflow, estado).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInfo {
    pub template_id: String,
    pub subject: String,
}

impl TemplateInfo {
    pub fn new(template_id: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            template_id: template_id.into(),
            subject: subject.into(),
        }
    }
}

/// Destinatário de uma notificação (normalmente o cidadão titular do caso).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub id: String,
    pub display_name: String,
    pub destination_address: Option<String>,
}

impl Recipient {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        destination_address: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            destination_address,
        }
    }

    /// Endereço de destino, se presente e não vazio.
    pub fn address(&self) -> Option<&str> {
        self.destination_address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }
}

/// Resultado da consulta de uma entidade: destinatário e variáveis do template.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntityDetails {
    pub recipient: Option<Recipient>,
    pub variables: BTreeMap<String, String>,
}

impl EntityDetails {
    pub fn new(recipient: Recipient) -> Self {
        Self {
            recipient: Some(recipient),
            variables: BTreeMap::new(),
        }
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }
}

/// Mensagem entregue ao canal de saída.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    pub recipient_id: String,
    pub to_address: String,
    pub subject: String,
    pub template_id: String,
    pub variables: BTreeMap<String, String>,
    pub workflow_name: WorkflowKind,
    pub entity_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_address_is_absent() {
        let blank = Recipient::new("1", "Ana", Some("  ".into()));
        assert_eq!(blank.address(), None);
        let missing = Recipient::new("1", "Ana", None);
        assert_eq!(missing.address(), None);
        let present = Recipient::new("1", "Ana", Some(" ana@example.org ".into()));
        assert_eq!(present.address(), Some("ana@example.org"));
    }

    #[test]
    fn message_matches_wire_schema() {
        let message = NotificationMessage {
            recipient_id: "c-1".into(),
            to_address: "ana@example.org".into(),
            subject: "Visto emitido".into(),
            template_id: "visa-emitido".into(),
            variables: BTreeMap::from([("displayName".to_string(), "Ana".to_string())]),
            workflow_name: WorkflowKind::Visa,
            entity_id: "v-1".into(),
        };
        let json = serde_json::to_value(&message).unwrap();
        let mut keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "entityId",
                "recipientId",
                "subject",
                "templateId",
                "toAddress",
                "variables",
                "workflowName",
            ]
        );
        assert_eq!(json["workflowName"], "Visa");
        assert_eq!(json["variables"]["displayName"], "Ana");
    }
}
