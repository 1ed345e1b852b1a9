use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};
use tera::{Context, Tera};

/// Every outbound text the engine produces. Tenants override a template by storing its
/// key in `TenantConfig::templates`; anything absent falls back to the built-in text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TemplateKey {
    Welcome,
    Menu,
    InvalidOption,
    CoursesList,
    CoursesEmpty,
    CourseDetail,
    FaqCategories,
    FaqQuestions,
    FaqAnswer,
    FaqEmpty,
    AppointmentDatePrompt,
    AppointmentInvalidDate,
    AppointmentNoSlots,
    AppointmentSlots,
    AppointmentInvalidTime,
    AppointmentConfirm,
    AppointmentConfirmRetry,
    AppointmentCreated,
    AppointmentConflict,
    AppointmentDeclined,
    EnrollmentPrompt,
    EnrollmentInvalidName,
    EnrollmentReceived,
    PaymentPix,
    PaymentPending,
    PaymentFailed,
    PaymentConfirmed,
    HumanQueue,
    LeaveMessagePrompt,
    MessageLeft,
    Documents,
    Contact,
    FormInvalid,
    FormInvalidEmail,
    FormComplete,
    Suspended,
    UnsupportedMedia,
    InternalError,
}

impl TemplateKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::Menu => "menu",
            Self::InvalidOption => "invalid_option",
            Self::CoursesList => "courses_list",
            Self::CoursesEmpty => "courses_empty",
            Self::CourseDetail => "course_detail",
            Self::FaqCategories => "faq_categories",
            Self::FaqQuestions => "faq_questions",
            Self::FaqAnswer => "faq_answer",
            Self::FaqEmpty => "faq_empty",
            Self::AppointmentDatePrompt => "appointment_date_prompt",
            Self::AppointmentInvalidDate => "appointment_invalid_date",
            Self::AppointmentNoSlots => "appointment_no_slots",
            Self::AppointmentSlots => "appointment_slots",
            Self::AppointmentInvalidTime => "appointment_invalid_time",
            Self::AppointmentConfirm => "appointment_confirm",
            Self::AppointmentConfirmRetry => "appointment_confirm_retry",
            Self::AppointmentCreated => "appointment_created",
            Self::AppointmentConflict => "appointment_conflict",
            Self::AppointmentDeclined => "appointment_declined",
            Self::EnrollmentPrompt => "enrollment_prompt",
            Self::EnrollmentInvalidName => "enrollment_invalid_name",
            Self::EnrollmentReceived => "enrollment_received",
            Self::PaymentPix => "payment_pix",
            Self::PaymentPending => "payment_pending",
            Self::PaymentFailed => "payment_failed",
            Self::PaymentConfirmed => "payment_confirmed",
            Self::HumanQueue => "human_queue",
            Self::LeaveMessagePrompt => "leave_message_prompt",
            Self::MessageLeft => "message_left",
            Self::Documents => "documents",
            Self::Contact => "contact",
            Self::FormInvalid => "form_invalid",
            Self::FormInvalidEmail => "form_invalid_email",
            Self::FormComplete => "form_complete",
            Self::Suspended => "suspended",
            Self::UnsupportedMedia => "unsupported_media",
            Self::InternalError => "internal_error",
        }
    }

    fn default_source(&self) -> &'static str {
        match self {
            Self::Welcome => {
                "Olá{% if name %}, {{ name }}{% endif %}! Seja bem-vindo(a) ao atendimento \
                 de {{ business_name }}."
            }
            Self::Menu => "{{ title }}\n\n{{ options }}\n\nDigite o número da opção desejada.",
            Self::InvalidOption => {
                "Opção inválida. Digite um dos números apresentados ou 0 para voltar ao menu."
            }
            Self::CoursesList => {
                "Nossos cursos:\n\n{{ options }}\n\nDigite o número do curso para ver os \
                 detalhes ou 0 para voltar ao menu."
            }
            Self::CoursesEmpty => "No momento não há cursos disponíveis.",
            Self::CourseDetail => {
                "*{{ title }}*\n{{ description }}{% if price %}\nInvestimento: {{ price }}\
                 {% endif %}\
                 \n\n1. Quero me matricular\n2. Agendar uma visita\n0. Voltar ao menu"
            }
            Self::FaqCategories => {
                "Dúvidas frequentes:\n\n{{ options }}\n\nDigite o número da categoria."
            }
            Self::FaqQuestions => {
                "*{{ category }}*\n\n{{ options }}\n\nDigite o número da pergunta."
            }
            Self::FaqAnswer => {
                "*{{ question }}*\n{{ answer }}\n\nDigite outro número para ver mais perguntas \
                 desta categoria ou 0 para voltar ao menu."
            }
            Self::FaqEmpty => "Ainda não temos perguntas frequentes cadastradas.",
            Self::AppointmentDatePrompt => {
                "Para qual data você gostaria de agendar? Responda com DD/MM, \"hoje\" ou \
                 \"amanhã\"."
            }
            Self::AppointmentInvalidDate => {
                "Não entendi a data. Use o formato DD/MM, \"hoje\" ou \"amanhã\"."
            }
            Self::AppointmentNoSlots => {
                "Não há horários disponíveis em {{ date }}. Por favor, escolha outra data."
            }
            Self::AppointmentSlots => {
                "Horários disponíveis em {{ date }}:\n{{ slots }}\n\nResponda com o horário \
                 desejado (HH:MM)."
            }
            Self::AppointmentInvalidTime => {
                "Horário indisponível. Escolha um destes: {{ slots }}"
            }
            Self::AppointmentConfirm => {
                "Confirma o agendamento para {{ date }} às {{ time }}?\n1. Sim\n2. Não"
            }
            Self::AppointmentConfirmRetry => "Responda 1 para confirmar ou 2 para desistir.",
            Self::AppointmentCreated => {
                "Agendamento confirmado para {{ date }} às {{ time }}. Seu código é {{ code }}."
            }
            Self::AppointmentConflict => {
                "Desculpe, esse horário acabou de ser reservado. Vamos escolher outra data?"
            }
            Self::AppointmentDeclined => "Tudo bem, o agendamento não foi realizado.",
            Self::EnrollmentPrompt => {
                "Ótimo! Para iniciar sua matrícula{% if course %} em {{ course }}{% endif %}, \
                 informe seu nome completo."
            }
            Self::EnrollmentInvalidName => "Por favor, informe seu nome completo.",
            Self::EnrollmentReceived => {
                "Obrigado, {{ name }}! Recebemos seu pedido de matrícula e entraremos em \
                 contato em breve."
            }
            Self::PaymentPix => {
                "Para concluir sua matrícula em {{ course }}, pague {{ amount }} via PIX \
                 copia e cola:\n\n{{ copy_paste }}"
            }
            Self::PaymentPending => {
                "Ainda aguardamos a confirmação do pagamento. Código PIX copia e cola:\n\n\
                 {{ copy_paste }}\n\nDigite 0 para voltar ao menu."
            }
            Self::PaymentFailed => {
                "Não foi possível gerar o pagamento agora. Nossa equipe entrará em contato."
            }
            Self::PaymentConfirmed => "Pagamento confirmado! Sua matrícula está garantida.",
            Self::HumanQueue => "Certo! Um atendente vai falar com você em instantes.",
            Self::LeaveMessagePrompt => {
                "Nosso atendimento humano está fora do horário. Deixe sua mensagem que \
                 retornaremos assim que possível."
            }
            Self::MessageLeft => "Mensagem registrada! Retornaremos em breve.",
            Self::Documents => {
                "{% if documents %}{{ documents }}{% else %}Consulte a secretaria para a lista \
                 de documentos necessários.{% endif %}"
            }
            Self::Contact => {
                "{% if contact %}{{ contact }}{% else %}Fale com {{ business_name }} pelos \
                 nossos canais oficiais.{% endif %}"
            }
            Self::FormInvalid => "Resposta inválida. {{ prompt }}",
            Self::FormInvalidEmail => "E-mail inválido. {{ prompt }}",
            Self::FormComplete => "Obrigado! Recebemos suas informações.",
            Self::Suspended => {
                "Este atendimento está temporariamente indisponível. Por favor, tente novamente \
                 mais tarde."
            }
            Self::UnsupportedMedia => {
                "Desculpe, ainda não consigo processar áudios ou figurinhas. Por favor, envie \
                 sua mensagem em texto."
            }
            Self::InternalError => {
                "Desculpe, ocorreu um erro ao processar sua mensagem. Tente novamente em \
                 instantes."
            }
        }
    }
}

/// Renders templates for one tenant, preferring its overrides.
#[derive(Clone, Copy, Debug)]
pub struct TemplateRenderer<'a> {
    overrides: &'a BTreeMap<String, String>,
}

impl<'a> TemplateRenderer<'a> {
    pub fn new(overrides: &'a BTreeMap<String, String>) -> Self {
        Self { overrides }
    }

    pub fn render(&self, key: TemplateKey, context: &Context) -> String {
        if let Some(source) = self.overrides.get(key.as_str()) {
            match Tera::one_off(source, context, false) {
                Ok(rendered) => return rendered,
                Err(error) => {
                    tracing::warn!(
                        event_name = "render.tenant_template_failed",
                        template = key.as_str(),
                        error = %error,
                        "tenant template failed to render; using built-in text"
                    );
                }
            }
        }

        let source = key.default_source();
        Tera::one_off(source, context, false).unwrap_or_else(|error| {
            tracing::error!(
                event_name = "render.default_template_failed",
                template = key.as_str(),
                error = %error,
                "built-in template failed to render"
            );
            source.to_string()
        })
    }

    pub fn render_plain(&self, key: TemplateKey) -> String {
        self.render(key, &Context::new())
    }
}

/// Builds a template context from string pairs.
pub fn context<'k, I>(pairs: I) -> Context
where
    I: IntoIterator<Item = (&'k str, String)>,
{
    let mut context = Context::new();
    for (key, value) in pairs {
        context.insert(key, &value);
    }
    context
}

/// `1. first\n2. second`, numbered from one.
pub fn numbered<'i, I>(items: I) -> String
where
    I: IntoIterator<Item = &'i str>,
{
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| format!("{}. {item}", index + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Brazilian real formatting: `R$ 1.234,50`.
pub fn format_brl(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let plain = format!("{:.2}", rounded.abs());
    let (integer, fraction) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (index, digit) in integer.chars().enumerate() {
        if index > 0 && (integer.len() - index) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    format!("{}R$ {grouped},{fraction}", if negative { "-" } else { "" })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::{context, format_brl, numbered, TemplateKey, TemplateRenderer};

    #[test]
    fn built_in_templates_render_variables() {
        let overrides = BTreeMap::new();
        let renderer = TemplateRenderer::new(&overrides);

        let welcome = renderer.render(
            TemplateKey::Welcome,
            &context([("name", "Ana".to_string()), ("business_name", "Escola X".to_string())]),
        );
        assert_eq!(welcome, "Olá, Ana! Seja bem-vindo(a) ao atendimento de Escola X.");

        let anonymous = renderer.render(
            TemplateKey::Welcome,
            &context([("name", String::new()), ("business_name", "Escola X".to_string())]),
        );
        assert!(anonymous.starts_with("Olá! Seja"));
    }

    #[test]
    fn tenant_override_wins_and_broken_override_falls_back() {
        let mut overrides = BTreeMap::new();
        overrides.insert("human_queue".to_string(), "Aguarde, {{ business_name }}.".to_string());
        overrides.insert("message_left".to_string(), "{% if %}".to_string());
        let renderer = TemplateRenderer::new(&overrides);

        let queue = renderer
            .render(TemplateKey::HumanQueue, &context([("business_name", "Escola X".to_string())]));
        assert_eq!(queue, "Aguarde, Escola X.");
        assert_eq!(
            renderer.render_plain(TemplateKey::MessageLeft),
            "Mensagem registrada! Retornaremos em breve."
        );
    }

    #[test]
    fn numbered_lists_start_at_one() {
        assert_eq!(numbered(["Cursos", "FAQ"]), "1. Cursos\n2. FAQ");
        assert_eq!(numbered(Vec::<&str>::new()), "");
    }

    #[test]
    fn currency_formatting_groups_thousands() {
        assert_eq!(format_brl(Decimal::from_str("1234.5").expect("decimal")), "R$ 1.234,50");
        assert_eq!(format_brl(Decimal::from_str("99.999").expect("decimal")), "R$ 100,00");
        assert_eq!(format_brl(Decimal::from(1_000_000)), "R$ 1.000.000,00");
        assert_eq!(format_brl(Decimal::ZERO), "R$ 0,00");
    }
}
