//! Render pass assembly.

use ash::vk;

use crate::device::Device;
use crate::error::Result;

/// Attachment references for one subpass.
#[derive(Debug, Clone, Default)]
pub struct SubpassBuilder {
    color: Vec<vk::AttachmentReference>,
    depth_stencil: Option<vk::AttachmentReference>,
}

impl SubpassBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reference an attachment as color output in `COLOR_ATTACHMENT_OPTIMAL`.
    pub fn color_attachment(mut self, index: u32) -> Self {
        self.color.push(vk::AttachmentReference {
            attachment: index,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        });
        self
    }

    pub fn depth_stencil_attachment(mut self, index: u32) -> Self {
        self.depth_stencil = Some(vk::AttachmentReference {
            attachment: index,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        });
        self
    }
}

/// Builder for a `vk::RenderPass`.
#[derive(Debug, Clone, Default)]
pub struct RenderPassBuilder {
    attachments: Vec<vk::AttachmentDescription>,
    subpasses: Vec<SubpassBuilder>,
    dependencies: Vec<vk::SubpassDependency>,
}

impl RenderPassBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cleared single-sample color attachment kept in attachment layout.
    pub fn color_attachment(self, format: vk::Format) -> Self {
        self.attachment(color_description(
            format,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ))
    }

    /// Cleared single-sample color attachment handed to presentation.
    pub fn present_attachment(self, format: vk::Format) -> Self {
        self.attachment(color_description(format, vk::ImageLayout::PRESENT_SRC_KHR))
    }

    pub fn attachment(mut self, description: vk::AttachmentDescription) -> Self {
        self.attachments.push(description);
        self
    }

    pub fn subpass(mut self, subpass: SubpassBuilder) -> Self {
        self.subpasses.push(subpass);
        self
    }

    /// Color-output dependency between two subpasses.
    pub fn dependency(self, src_subpass: u32, dst_subpass: u32) -> Self {
        self.raw_dependency(vk::SubpassDependency {
            src_subpass,
            dst_subpass,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_READ
                | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            dependency_flags: vk::DependencyFlags::empty(),
        })
    }

    pub fn raw_dependency(mut self, dependency: vk::SubpassDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn attachments(&self) -> &[vk::AttachmentDescription] {
        &self.attachments
    }

    pub fn dependencies(&self) -> &[vk::SubpassDependency] {
        &self.dependencies
    }

    /// Create the render pass.
    pub fn build(&self, device: &Device) -> Result<vk::RenderPass> {
        let subpasses: Vec<vk::SubpassDescription> = self
            .subpasses
            .iter()
            .map(|s| {
                let mut desc = vk::SubpassDescription::default()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .color_attachments(&s.color);
                if let Some(depth) = &s.depth_stencil {
                    desc = desc.depth_stencil_attachment(depth);
                }
                desc
            })
            .collect();

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&self.attachments)
            .subpasses(&subpasses)
            .dependencies(&self.dependencies);

        // SAFETY: create_info only references data owned by self
        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None) }?;
        tracing::debug!(
            attachments = self.attachments.len(),
            subpasses = subpasses.len(),
            "Render pass created"
        );
        Ok(render_pass)
    }
}

fn color_description(format: vk::Format, final_layout: vk::ImageLayout) -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(final_layout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_attachment_layout() {
        let builder = RenderPassBuilder::new()
            .present_attachment(vk::Format::B8G8R8A8_SRGB)
            .color_attachment(vk::Format::R16G16B16A16_SFLOAT);

        let [present, color] = builder.attachments() else {
            panic!("expected two attachments");
        };
        assert_eq!(present.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(present.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(color.final_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(color.format, vk::Format::R16G16B16A16_SFLOAT);
    }

    #[test]
    fn default_dependency_masks() {
        let builder = RenderPassBuilder::new().dependency(vk::SUBPASS_EXTERNAL, 0);
        let dep = builder.dependencies()[0];
        assert_eq!(dep.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dep.src_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert!(dep
            .dst_access_mask
            .contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
    }

    #[test]
    fn subpass_references() {
        let subpass = SubpassBuilder::new()
            .color_attachment(0)
            .depth_stencil_attachment(1);
        assert_eq!(subpass.color.len(), 1);
        assert_eq!(
            subpass.depth_stencil.map(|r| r.layout),
            Some(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        );
    }
}
