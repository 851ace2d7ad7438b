use crate::common::ChatMessage;
use crate::ui::colors::UserColors;

pub fn render(ui: &mut egui::Ui, messages: &[ChatMessage], own_user: &str, colors: &mut UserColors) {
    egui::ScrollArea::vertical()
        .auto_shrink([false, false])
        .stick_to_bottom(true)
        .show(ui, |ui| {
            if messages.is_empty() {
                ui.label(egui::RichText::new("No messages yet").weak());
                return;
            }

            for message in messages {
                ui.horizontal_wrapped(|ui| {
                    let name = if message.user == own_user {
                        "You"
                    } else {
                        message.user.as_str()
                    };
                    ui.colored_label(colors.color_for(&message.user), name);
                    ui.label(&message.message);
                    ui.label(egui::RichText::new(&message.timestamp).weak().small());
                });
            }
        });
}
