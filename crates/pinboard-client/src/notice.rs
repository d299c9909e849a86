//! Short, dismissible user-facing notifications.

use crate::config::Locale;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeKind {
    IdentityUnconfigured,
    UnauthorizedDomain { domain: String },
    LoginSucceeded,
    LoginFailed,
    LoggedOut,
    AccessDenied { email: String },
    SessionFailed,
    SnapshotFailed { collection: &'static str },
    RealtimeUnavailable { collection: &'static str },
    PinGiven { receiver: String },
    PinFailed,
    PinInvalidated,
    InvalidateFailed,
    ReactionFailed,
    AccountRemoved,
    AccountRemovalFailed,
    AvatarAdded,
    AvatarUpdated,
    AvatarRemoved,
    AvatarFailed,
    AvatarEquipped { name: String },
    InsufficientPoints { missing: i64 },
    EquipFailed,
    InviteAdded { email: String },
    InviteRemoved,
    InviteFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub kind: NoticeKind,
    pub title: String,
    pub description: Option<String>,
}

impl Notice {
    pub fn new(kind: NoticeKind, locale: Locale) -> Self {
        let (title, description) = match locale {
            Locale::En => english(&kind),
            Locale::PtBr => portuguese(&kind),
        };
        Self {
            level: level_of(&kind),
            kind,
            title,
            description,
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}

fn level_of(kind: &NoticeKind) -> NoticeLevel {
    use NoticeKind::*;
    match kind {
        LoginSucceeded | LoggedOut | PinGiven { .. } | PinInvalidated | AccountRemoved | AvatarAdded
        | AvatarUpdated | AvatarRemoved | AvatarEquipped { .. } | InviteAdded { .. } | InviteRemoved => {
            NoticeLevel::Info
        }
        _ => NoticeLevel::Error,
    }
}

fn english(kind: &NoticeKind) -> (String, Option<String>) {
    use NoticeKind::*;
    let (title, description): (&str, Option<String>) = match kind {
        IdentityUnconfigured => (
            "Configuration error",
            Some("Sign-in is not configured. Check the identity provider credentials.".into()),
        ),
        UnauthorizedDomain { domain } => (
            "Unauthorized domain",
            Some(format!(
                "The domain \"{}\" is not authorized for sign-in. Add it to the identity provider's authorized domains.",
                domain
            )),
        ),
        LoginSucceeded => ("Signed in!", None),
        LoginFailed => ("Sign-in failed", Some("Could not sign in with Google.".into())),
        LoggedOut => ("You signed out of your account.", None),
        AccessDenied { email } => (
            "Access denied",
            Some(format!("{} has not been invited.", email)),
        ),
        SessionFailed => ("Sign-in failed", Some("Could not load your account.".into())),
        SnapshotFailed { collection } => (
            "Could not refresh data",
            Some(format!("Showing the last loaded {}.", collection)),
        ),
        RealtimeUnavailable { collection } => (
            "Live updates unavailable",
            Some(format!("Changes to {} will appear after the next refresh.", collection)),
        ),
        PinGiven { receiver } => ("PIN sent!", Some(format!("You gave a PIN to {}.", receiver))),
        PinFailed => ("Could not send PIN", Some("The PIN was not saved.".into())),
        PinInvalidated => ("PIN invalidated.", None),
        InvalidateFailed => ("Could not invalidate PIN", None),
        ReactionFailed => ("Could not save reaction", None),
        AccountRemoved => ("User removed.", None),
        AccountRemovalFailed => ("Could not remove user", None),
        AvatarAdded => ("Avatar added!", None),
        AvatarUpdated => ("Avatar updated!", None),
        AvatarRemoved => ("Avatar removed!", None),
        AvatarFailed => ("Could not save avatar changes", None),
        AvatarEquipped { name } => (
            "Purchase complete!",
            Some(format!("You unlocked the \"{}\" avatar.", name)),
        ),
        InsufficientPoints { missing } => (
            "Not enough points",
            Some(format!("You need {} more points to buy this.", missing)),
        ),
        EquipFailed => ("Could not change avatar", None),
        InviteAdded { email } => ("Invite sent", Some(format!("{} can now sign in.", email))),
        InviteRemoved => ("Invite removed.", None),
        InviteFailed => ("Could not update invites", None),
    };
    (title.to_string(), description)
}

fn portuguese(kind: &NoticeKind) -> (String, Option<String>) {
    use NoticeKind::*;
    let (title, description): (&str, Option<String>) = match kind {
        IdentityUnconfigured => (
            "Erro de Configuração",
            Some("A autenticação não está configurada. Verifique suas credenciais.".into()),
        ),
        UnauthorizedDomain { domain } => (
            "Domínio não autorizado",
            Some(format!(
                "O domínio \"{}\" não está autorizado para login. Adicione-o aos domínios autorizados do provedor.",
                domain
            )),
        ),
        LoginSucceeded => ("Login bem-sucedido!", None),
        LoginFailed => ("Erro no login", Some("Não foi possível fazer login com o Google.".into())),
        LoggedOut => ("Você saiu da sua conta.", None),
        AccessDenied { email } => ("Acesso negado", Some(format!("{} não foi convidado.", email))),
        SessionFailed => ("Erro no login", Some("Não foi possível carregar sua conta.".into())),
        SnapshotFailed { collection } => (
            "Falha ao atualizar os dados",
            Some(format!("Exibindo os últimos dados carregados de {}.", collection)),
        ),
        RealtimeUnavailable { collection } => (
            "Atualizações ao vivo indisponíveis",
            Some(format!("Mudanças em {} aparecerão na próxima atualização.", collection)),
        ),
        PinGiven { receiver } => ("PIN Enviado!", Some(format!("Você deu um PIN para {}.", receiver))),
        PinFailed => ("Erro ao enviar PIN", Some("O PIN não foi salvo.".into())),
        PinInvalidated => ("PIN invalidado com sucesso.", None),
        InvalidateFailed => ("Erro ao invalidar PIN", None),
        ReactionFailed => ("Erro ao salvar reação", None),
        AccountRemoved => ("Usuário removido com sucesso.", None),
        AccountRemovalFailed => ("Erro ao remover usuário", None),
        AvatarAdded => ("Avatar adicionado com sucesso!", None),
        AvatarUpdated => ("Avatar atualizado com sucesso!", None),
        AvatarRemoved => ("Avatar removido com sucesso!", None),
        AvatarFailed => ("Erro ao salvar avatar", None),
        AvatarEquipped { name } => (
            "Compra Realizada!",
            Some(format!("Você desbloqueou o avatar \"{}\".", name)),
        ),
        InsufficientPoints { missing } => (
            "Pontos insuficientes",
            Some(format!("Você precisa de mais {} pontos para comprar isto.", missing)),
        ),
        EquipFailed => ("Erro ao trocar avatar", None),
        InviteAdded { email } => ("Convite enviado", Some(format!("{} já pode entrar.", email))),
        InviteRemoved => ("Convite removido.", None),
        InviteFailed => ("Erro ao atualizar convites", None),
    };
    (title.to_string(), description)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        assert!(Notice::new(NoticeKind::PinFailed, Locale::En).is_error());
        assert!(!Notice::new(NoticeKind::PinInvalidated, Locale::En).is_error());
    }

    #[test]
    fn test_localized_shortfall() {
        let notice = Notice::new(NoticeKind::InsufficientPoints { missing: 7 }, Locale::PtBr);
        assert_eq!(notice.title, "Pontos insuficientes");
        assert_eq!(
            notice.description.as_deref(),
            Some("Você precisa de mais 7 pontos para comprar isto.")
        );
    }
}
