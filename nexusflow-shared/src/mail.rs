/// Outbound email templates
///
/// Each function renders a plain-text [`NewEmail`] ready for
/// [`OutboxEmail::enqueue`](crate::models::email_outbox::OutboxEmail::enqueue).

use chrono::{DateTime, Utc};

use crate::models::email_outbox::NewEmail;

/// Verification code sent at registration and on resend
pub fn otp_email(to: &str, name: &str, code: &str, expires_at: DateTime<Utc>) -> NewEmail {
    let minutes = (expires_at - Utc::now()).num_minutes().max(1);

    NewEmail {
        to_address: to.to_string(),
        subject: format!("Your NexusFlow verification code: {}", code),
        body_text: format!(
            "Hi {name},\n\n\
             Your verification code is {code}.\n\
             It expires in {minutes} minutes.\n\n\
             If you didn't create a NexusFlow account you can ignore this email.\n"
        ),
    }
}

/// Sent when an admin creates an account for someone
pub fn welcome_email(to: &str, name: &str, organization: &str, invited_by: &str) -> NewEmail {
    NewEmail {
        to_address: to.to_string(),
        subject: format!("You've been added to {} on NexusFlow", organization),
        body_text: format!(
            "Hi {name},\n\n\
             {invited_by} created a NexusFlow account for you in {organization}.\n\
             Sign in with this email address and the password you were given,\n\
             then change it from your profile.\n"
        ),
    }
}

pub fn task_assigned_email(to: &str, assignee: &str, task_title: &str, assigned_by: &str) -> NewEmail {
    NewEmail {
        to_address: to.to_string(),
        subject: format!("New task: {}", task_title),
        body_text: format!(
            "Hi {assignee},\n\n\
             {assigned_by} assigned you the task \"{task_title}\".\n"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_otp_email() {
        let email = otp_email("jane@acme.test", "Jane", "042042", Utc::now() + Duration::minutes(10));

        assert_eq!(email.to_address, "jane@acme.test");
        assert!(email.subject.contains("042042"));
        assert!(email.body_text.starts_with("Hi Jane,"));
        assert!(email.body_text.contains("minutes"));
    }

    #[test]
    fn test_otp_email_never_says_zero_minutes() {
        let email = otp_email("a@b.test", "A", "111111", Utc::now());
        assert!(email.body_text.contains("expires in 1 minutes"));
    }

    #[test]
    fn test_welcome_and_assignment_emails() {
        let welcome = welcome_email("bob@acme.test", "Bob", "Acme", "Jane");
        assert!(welcome.subject.contains("Acme"));
        assert!(welcome.body_text.contains("Jane created"));

        let assigned = task_assigned_email("bob@acme.test", "Bob", "Fix login", "Jane");
        assert_eq!(assigned.subject, "New task: Fix login");
        assert!(assigned.body_text.contains("\"Fix login\""));
    }
}
