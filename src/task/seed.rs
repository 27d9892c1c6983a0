#![forbid(unsafe_code)]

use time::OffsetDateTime;

use crate::task::model::{Priority, Task};

/// Example tasks written on first run for a device with no collection yet.
#[must_use]
pub fn seed_tasks(now: OffsetDateTime) -> Vec<Task> {
    [
        (
            "1",
            "Revisar relatório mensal",
            "Analisar dados de vendas e preparar apresentação",
            Priority::High,
            false,
        ),
        (
            "2",
            "Comprar ingredientes",
            "Lista: arroz, frango, legumes",
            Priority::Medium,
            false,
        ),
        (
            "3",
            "Agendar consulta médica",
            "Marcar consulta com cardiologista",
            Priority::Low,
            true,
        ),
    ]
    .into_iter()
    .map(|(id, title, description, priority, completed)| Task {
        id: id.to_owned(),
        title: title.to_owned(),
        description: Some(description.to_owned()),
        priority,
        completed,
        created_at: now,
        due_date: None,
        reminder_sent: false,
        extra: serde_json::Map::new(),
    })
    .collect()
}
