//! Outbound message texts.

use rollcall_core::{Activity, Event};
use rollcall_delivery::DeliveryTask;

const BROADCAST_FOOTER: &str = "\n\n---\nEsta é uma mensagem automática do sistema de eventos.";

pub(crate) fn registration(to: &str, name: &str, activity: &Activity, event: &Event) -> DeliveryTask {
    DeliveryTask::notification(
        to,
        format!("Inscrição Confirmada: {}", activity.name),
        format!(
            "Olá {}, sua inscrição na atividade {} do evento {} foi confirmada!",
            name, activity.name, event.name
        ),
    )
}

pub(crate) fn attendance(to: &str, name: &str, activity: &Activity) -> DeliveryTask {
    DeliveryTask::notification(
        to,
        format!("Presença Confirmada: {}", activity.name),
        format!(
            "Parabéns {}! Sua presença na atividade {} foi registrada com sucesso.",
            name, activity.name
        ),
    )
}

pub(crate) fn certificate(to: &str, name: &str, event: &Event) -> DeliveryTask {
    DeliveryTask::notification(
        to,
        format!("Seu Certificado: {}", event.name),
        format!(
            "Olá {}, seu certificado de participação no evento {} está disponível para validação em nossa plataforma e segue em anexo.",
            name, event.name
        ),
    )
}

pub(crate) fn resend(to: &str, name: &str, event: &Event) -> DeliveryTask {
    DeliveryTask::notification(
        to,
        format!("Reenvio de Certificado: {}", event.name),
        format!("Olá {}, seu certificado de participação foi reenviado.", name),
    )
}

pub(crate) fn broadcast(to: &str, subject: &str, body: &str) -> DeliveryTask {
    DeliveryTask::notification(to, subject, format!("{}{}", body, BROADCAST_FOOTER))
}
